extern crate oklc;

mod add_barriers;
mod hoist_sections;
mod materialize_loops;
mod privatize_exclusive;
mod split_kernels;
