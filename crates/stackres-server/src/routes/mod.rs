pub mod events;
pub mod resources;
pub mod stacks;
