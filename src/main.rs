use clap::Parser;
use taquero::cli::{
    handle_add, handle_cached, handle_delete, handle_fetch, handle_init, handle_list,
    handle_modules, handle_proving_batch, handle_proving_create, handle_proving_list,
    handle_proving_reset, handle_serve, handle_sync, Cli, Commands, ProvingAction,
};
use taquero::logging;

fn main() {
    let cli = Cli::parse();

    let level = match (&cli.command, cli.verbose) {
        (_, true) => "debug",
        (Commands::Serve { .. }, false) => "info",
        _ => "warn",
    };
    logging::init(level);

    let result = match cli.command {
        Commands::Init { bind } => handle_init(bind),
        Commands::Serve { bind } => handle_serve(bind),
        Commands::Modules { json } => handle_modules(json),
        Commands::List { module, json } => handle_list(module, json),
        Commands::Add {
            module,
            fields,
            stdin,
            remote,
            json,
        } => handle_add(module, fields, stdin, remote, json),
        Commands::Delete {
            module,
            id,
            force,
            remote,
        } => handle_delete(module, id, force, remote),
        Commands::Proving(proving) => match proving.action {
            ProvingAction::List { kind, status, json } => handle_proving_list(kind, status, json),
            ProvingAction::Create {
                kind,
                food_item,
                description,
                by,
                json,
            } => handle_proving_create(kind, food_item, description, by, json),
            ProvingAction::Batch {
                kind,
                method_id,
                end_temp,
                by,
                number,
                date,
                start_time,
                start_temp,
                end_time,
                notes,
                remote,
                json,
            } => handle_proving_batch(
                kind, method_id, end_temp, by, number, date, start_time, start_temp, end_time,
                notes, remote, json,
            ),
            ProvingAction::Reset { kind, method_id } => handle_proving_reset(kind, method_id),
        },
        Commands::Fetch { store } => handle_fetch(store),
        Commands::Cached { store, json } => handle_cached(store, json),
        Commands::Sync { store } => handle_sync(store),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
