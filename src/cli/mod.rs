mod commands;
mod handlers;

pub use commands::{Cli, Commands, ProvingAction, ProvingCommand};
pub use handlers::{
    handle_add, handle_cached, handle_delete, handle_fetch, handle_init, handle_list,
    handle_modules, handle_proving_batch, handle_proving_create, handle_proving_list,
    handle_proving_reset, handle_serve, handle_sync,
};
