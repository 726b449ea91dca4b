//! Built-in commands.
//!
//! Each command implements [`CliCommand`](crate::command::CliCommand) and is
//! a thin adapter over [`Env`](nunchucks_template::Env).

pub mod compile;
pub mod precompile;
pub mod render;

pub use compile::CompileCommand;
pub use precompile::PrecompileCommand;
pub use render::RenderCommand;

use crate::command::CommandRegistry;

/// Registers every built-in command into `registry`.
pub fn register_builtin_commands(registry: &mut CommandRegistry) {
    registry.register(Box::new(RenderCommand));
    registry.register(Box::new(CompileCommand));
    registry.register(Box::new(PrecompileCommand));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_builtin_commands() {
        let mut registry = CommandRegistry::new();
        register_builtin_commands(&mut registry);
        assert_eq!(registry.list_commands(), vec!["compile", "precompile", "render"]);
    }
}
