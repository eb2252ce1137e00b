use bevy::app::ScheduleRunnerPlugin;
use bevy::log::{Level, LogPlugin};
use clap::Parser;
use std::time::Duration;
use tether::cli::{Args, handle_list_integrators, handle_print_config, load_and_apply_config};
use tether::plugins::SimulationPlugin;
use tether::prelude::*;

fn main() -> AppExit {
    let args = Args::parse();

    if args.list_integrators {
        handle_list_integrators();
        return AppExit::Success;
    }

    let config = match load_and_apply_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return AppExit::error();
        }
    };

    if args.print_config {
        if let Err(e) = handle_print_config(&config) {
            eprintln!("Error: {e}");
            return AppExit::error();
        }
        return AppExit::Success;
    }

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let mut app = App::new();
    app.add_plugins((
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::ZERO)),
        LogPlugin {
            level,
            ..default()
        },
        SimulationPlugin::with_config(config),
    ));

    info!(
        "tether v{} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_DATE")
    );

    app.run()
}
