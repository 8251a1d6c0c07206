// ABOUTME: Backend implementations (direct CLI, mock).
// ABOUTME: Each backend implements the TaskClient trait.

pub mod direct_cli;
pub mod mock;
