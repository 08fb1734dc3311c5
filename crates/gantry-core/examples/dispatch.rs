// Dispatch one call to an action from a service definition file
// Usage: cargo run --example dispatch <service.yaml> <action> [json-args]
// Example: cargo run --example dispatch users.yaml get '{"id": 7}'

use gantry_core::http::{BearerAuth, ReqwestTransportFactory};
use gantry_core::{
    init_logging, CallInvocation, Dispatcher, GatewaySettings, ServiceDefinition, TracingContext,
};
use std::env;
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = GatewaySettings::default().with_env_overrides()?;
    init_logging(&settings.logging)?;

    let args: Vec<String> = env::args().collect();
    let (Some(file), Some(action)) = (args.get(1), args.get(2)) else {
        eprintln!("usage: dispatch <service.yaml> <action> [json-args]");
        std::process::exit(2);
    };
    let call_args: serde_json::Value = match args.get(3) {
        Some(raw) => serde_json::from_str(raw)?,
        None => serde_json::json!({}),
    };

    let definition = ServiceDefinition::from_file(Path::new(file))?;
    let mut service = definition.service_config();

    // Optional bearer token, e.g. GANTRY_TOKEN=... in .env
    if env::var("GANTRY_TOKEN").is_ok() {
        service = service.with_auth(Arc::new(BearerAuth::from_env("GANTRY_TOKEN")));
    }

    let mut dispatcher = Dispatcher::new(settings.clone(), Arc::new(ReqwestTransportFactory::new()));
    dispatcher.register_service(Arc::new(service), definition.action_configs(&settings)?)?;

    let call = CallInvocation::new(call_args, TracingContext::root("gantry-example"))
        .with_request_id(uuid::Uuid::new_v4().to_string());

    match dispatcher.dispatch(&definition.name, action, &call).await {
        Ok(success) => {
            println!("{}", serde_json::to_string_pretty(&success.debug_headers)?);
            println!("{}", serde_json::to_string_pretty(&success.response_data)?);
        }
        Err(failure) => {
            eprintln!("{}", serde_json::to_string_pretty(&failure.error)?);
            std::process::exit(1);
        }
    }

    Ok(())
}
