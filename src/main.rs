use std::{path::Path, process, sync::Arc};

use nucache::{
    application::error::AppError,
    cache::CacheConfig,
    config::{self, Command},
    domain::value::ConverterRegistry,
    infra::{memory::MemorySource, telemetry},
    presentation::views::{ContentView, RouteView, StatsView, TreeView},
    snapshot::PublishedSnapshotService,
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

fn main() {
    if let Err(error) = run() {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(source = report.source, chain = ?report.messages, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(source = report.source, chain = ?report.messages, "application error");
    });
}

fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;
    let cache_config = CacheConfig::from(&settings.cache);

    match cli_args.command {
        Command::Get(args) => {
            let service = load_service(&args.seed.seed, cache_config)?;
            service.with_snapshot(args.preview, |snapshot| {
                let content = snapshot
                    .cache(args.kind)
                    .get_by_id(args.id)
                    .ok_or_else(|| AppError::not_found(format!("{} {}", args.kind, args.id)))?;
                let view = ContentView::build(snapshot, &content, args.culture.as_deref())?;
                print_json(&view)
            })
        }
        Command::Route(args) => {
            let service = load_service(&args.seed.seed, cache_config)?;
            service.with_snapshot(args.preview, |snapshot| {
                let content = snapshot
                    .content()
                    .get_by_route(&args.route)
                    .ok_or_else(|| AppError::not_found(format!("route `{}`", args.route)))?;
                let view = RouteView {
                    route: args.route.clone(),
                    content: ContentView::build(snapshot, &content, None)?,
                };
                print_json(&view)
            })
        }
        Command::Tree(args) => {
            let service = load_service(&args.seed.seed, cache_config)?;
            service.with_snapshot(args.preview, |snapshot| {
                print_json(&TreeView::roots(snapshot, args.kind))
            })
        }
        Command::Stats(args) => {
            let service = load_service(&args.seed.seed, cache_config)?;
            print_json(&StatsView::from(service.stats()))
        }
    }
}

fn load_service(seed: &Path, config: CacheConfig) -> Result<PublishedSnapshotService, AppError> {
    let source = Arc::new(MemorySource::from_path(seed)?);
    let service =
        PublishedSnapshotService::new(config, source.clone(), source, ConverterRegistry::new());
    service.load_all()?;
    info!(seed = %seed.display(), "Cache loaded");
    Ok(service)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
