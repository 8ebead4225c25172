use std::{path::Path, process, sync::Arc};

use flux_contract::{
    cache::CacheConfig,
    config::{self, ActionsArgs, Command, InvokeArgs, Settings},
    contract::{Contract, ContractOptions, InvokeMode, Manifest, MemoryState},
    error::{AppError, ContractError},
    infra::{http::HttpTransport, telemetry},
    mock::MockFlow,
};
use serde_json::Value;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let contract = build_contract(&settings, cli_args.command.manifest()).await?;

    match cli_args.command {
        Command::Invoke(args) => run_invoke(&contract, args).await,
        Command::Actions(args) => run_actions(&contract, &args),
    }
}

async fn build_contract(settings: &Settings, manifest: &Path) -> Result<Contract, AppError> {
    let transport = HttpTransport::new(&settings.transport)?;
    let contract = Contract::new(
        ContractOptions::from(&settings.contract),
        &CacheConfig::from(&settings.cache),
        Arc::new(transport),
    );

    if settings.contract.mock_flow {
        // No operator on a terminal run: settle with the first record.
        contract.on_mock_flow(|flow: MockFlow| {
            let Some(first) = flow.mocks().first() else {
                flow.reject("no mock records");
                return;
            };
            warn!(
                route = flow.argv().route.name(),
                records = flow.mocks().len(),
                "Settling interactive mock with its first record"
            );
            flow.resolve(first.data.clone());
        });
    }

    let manifest = Manifest::from_path(manifest).await?;
    contract.load(manifest)?;
    info!(
        project = contract.project_name().as_deref().unwrap_or("-"),
        routes = contract.routes().len(),
        schemas = contract.schema().names().len(),
        "Contract loaded"
    );
    Ok(contract)
}

async fn run_invoke(contract: &Contract, args: InvokeArgs) -> Result<(), AppError> {
    let payload = match args.data.as_deref() {
        Some(text) => serde_json::from_str(text)
            .map_err(|err| AppError::InvalidInput(format!("--data is not valid JSON: {err}")))?,
        None => Value::Null,
    };

    let table = contract.actions(args.is_default);
    let result = if args.fetch {
        contract
            .dispatch(&table, &args.action, payload, InvokeMode::Fetch)
            .await?
    } else {
        let state = MemoryState::new();
        contract
            .dispatch(&table, &args.action, payload, InvokeMode::Commit(&state))
            .await?;
        Some(state.snapshot())
    };

    print_json(&result.unwrap_or(Value::Null))
}

fn run_actions(contract: &Contract, args: &ActionsArgs) -> Result<(), AppError> {
    let table = contract.actions(args.is_default);
    for name in table.names() {
        println!("{name}");
    }
    Ok(())
}

fn print_json(value: &Value) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(value).map_err(ContractError::from)?;
    println!("{text}");
    Ok(())
}
