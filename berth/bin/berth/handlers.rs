use std::{path::PathBuf, sync::Arc};

use berth::{
    config::{DeployOptions, InstallConfig, Settings},
    management::AppManager,
    progress::LogSink,
    BerthError, BerthResult,
};
use tokio::io::AsyncReadExt;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Connects an [`AppManager`] rooted at the given home (or the default one).
pub async fn connect(home: Option<PathBuf>) -> BerthResult<AppManager> {
    let settings = match home {
        Some(home) => Settings::under_home(home),
        None => Settings::resolve_home()?,
    };

    AppManager::connect(settings, Arc::new(LogSink)).await
}

/// `berth init`. The home layout and database are created on connect; this
/// just reports where they landed.
pub async fn init_subcommand(manager: &AppManager) -> BerthResult<()> {
    let settings = manager.settings();
    println!("data directory:    {}", settings.get_data_dir().display());
    println!("install directory: {}", settings.get_install_dir().display());
    println!("trash directory:   {}", settings.get_trash_dir().display());
    println!("state database:    {}", settings.get_db_path().display());
    Ok(())
}

/// `berth deploy`
#[allow(clippy::too_many_arguments)]
pub async fn deploy_subcommand(
    manager: &AppManager,
    app_id: String,
    compose: Option<PathBuf>,
    stdin: bool,
    ports: Vec<String>,
    volumes: Vec<String>,
    envs: Vec<String>,
    web_ui_port: Option<u16>,
    name: Option<String>,
    depends_on: Vec<String>,
) -> BerthResult<()> {
    let config = InstallConfig::builder()
        .ports(parse_all(&ports)?)
        .volumes(parse_all(&volumes)?)
        .envs(parse_all(&envs)?)
        .web_ui_port(web_ui_port)
        .build();

    let compose_content = if stdin {
        let mut content = String::new();
        tokio::io::stdin().read_to_string(&mut content).await?;
        Some(content)
    } else {
        None
    };

    let options = DeployOptions::builder()
        .app_id(app_id)
        .compose_content(compose_content)
        .compose_path(compose)
        .install_config(config)
        .display_name(name)
        .dependencies(depends_on)
        .build();

    let outcome = manager.deploy(options).await;
    if outcome.success {
        println!("deployed");
        Ok(())
    } else {
        eprintln!("{}", outcome.error.unwrap_or_else(|| "deploy failed".to_string()));
        std::process::exit(1);
    }
}

/// `berth start|stop|restart|update`
pub async fn verb_subcommand(manager: &AppManager, verb: &str, name: &str) {
    let ok = match verb {
        "start" => manager.start(name).await,
        "stop" => manager.stop(name).await,
        "restart" => manager.restart(name).await,
        "update" => manager.update(name).await,
        _ => false,
    };

    if ok {
        println!("{} ok", verb);
    } else {
        eprintln!("{} failed (see logs)", verb);
        std::process::exit(1);
    }
}

/// `berth uninstall`
pub async fn uninstall_subcommand(manager: &AppManager, app_id: &str, purge: bool) {
    if manager.uninstall(app_id, purge).await {
        if purge {
            println!("uninstalled, data deleted");
        } else {
            println!("uninstalled, data moved to trash");
        }
    } else {
        eprintln!("uninstall failed (see logs)");
        std::process::exit(1);
    }
}

/// `berth list`
pub async fn list_subcommand(manager: &AppManager) {
    let apps = manager.list_apps().await;
    if apps.is_empty() {
        println!("no apps");
        return;
    }

    println!(
        "{:<24} {:<28} {:<10} {:<8} {}",
        "APP", "PRIMARY", "STATUS", "PORT", "MANAGED"
    );
    for app in apps {
        println!(
            "{:<24} {:<28} {:<10} {:<8} {}",
            app.project,
            app.primary_container,
            app.status.to_string(),
            app.web_ui_port
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            if app.managed { "yes" } else { "no" },
        );
    }
}

/// `berth status`
pub async fn status_subcommand(manager: &AppManager, app_id: &str) {
    println!("{}", manager.status(app_id).await);
    if let Some(url) = manager.web_ui_url(app_id).await {
        println!("{}", url);
    }
}

/// `berth logs`
pub async fn logs_subcommand(manager: &AppManager, name: &str, lines: usize) {
    print!("{}", manager.logs(name, lines).await);
}

/// `berth empty-trash`
pub async fn empty_trash_subcommand(manager: &AppManager) {
    let removed = manager.empty_trash().await;
    println!("removed {} trash entr{}", removed, if removed == 1 { "y" } else { "ies" });
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn parse_all<T: std::str::FromStr<Err = BerthError>>(values: &[String]) -> BerthResult<Vec<T>> {
    values.iter().map(|value| value.parse()).collect()
}
