#[path = "mod.rs"]
mod internal;

use berth::{
    cli::{BerthArgs, BerthSubcommand},
    BerthResult,
};
use clap::{CommandFactory, Parser};
use internal::handlers;

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> BerthResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = BerthArgs::parse();

    if args.version {
        println!("berth {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let Some(subcommand) = args.subcommand else {
        BerthArgs::command().print_help()?;
        return Ok(());
    };

    let manager = handlers::connect(args.home).await?;

    match subcommand {
        BerthSubcommand::Init => {
            handlers::init_subcommand(&manager).await?;
        }
        BerthSubcommand::Deploy {
            app_id,
            compose,
            stdin,
            ports,
            volumes,
            envs,
            web_ui_port,
            name,
            depends_on,
        } => {
            handlers::deploy_subcommand(
                &manager,
                app_id,
                compose,
                stdin,
                ports,
                volumes,
                envs,
                web_ui_port,
                name,
                depends_on,
            )
            .await?;
        }
        BerthSubcommand::Start { name } => {
            handlers::verb_subcommand(&manager, "start", &name).await;
        }
        BerthSubcommand::Stop { name } => {
            handlers::verb_subcommand(&manager, "stop", &name).await;
        }
        BerthSubcommand::Restart { name } => {
            handlers::verb_subcommand(&manager, "restart", &name).await;
        }
        BerthSubcommand::Update { name } => {
            handlers::verb_subcommand(&manager, "update", &name).await;
        }
        BerthSubcommand::Uninstall { app_id, purge } => {
            handlers::uninstall_subcommand(&manager, &app_id, purge).await;
        }
        BerthSubcommand::List => {
            handlers::list_subcommand(&manager).await;
        }
        BerthSubcommand::Status { app_id } => {
            handlers::status_subcommand(&manager, &app_id).await;
        }
        BerthSubcommand::Logs { name, lines } => {
            handlers::logs_subcommand(&manager, &name, lines).await;
        }
        BerthSubcommand::EmptyTrash => {
            handlers::empty_trash_subcommand(&manager).await;
        }
    }

    Ok(())
}
