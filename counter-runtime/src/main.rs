// you don't want your counter to randomly crash
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

use {
    std::{path::PathBuf, process::exit},
    tracing::{info, error},
    clap::{Parser, Subcommand},
    anyhow::{Context, anyhow},
    counter_common::HttpRequest,
    counter_runtime::{
        runtime::{
            VisitorCounter,
            config::{ProcessEnvironment, StoreSettings},
        },
        server::{
            config::ServerConfig,
            logs::init_logging,
            server::CounterServer,
        },
        tools::{
            dns::{PorkbunClient, PorkbunCredentials, DnsRecord, RecordType, CreateRecordOutcome, PORKBUN_API_BASE, DEFAULT_TTL},
            upload::{load_documents, upload},
        },
    },
};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Server config file (yaml). Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the visitor counter over http.
    Serve,
    /// Run the visitor counter handler once and print the response.
    Invoke {
        method: String,
    },
    /// Upsert documents from a json file into the configured store.
    Upload {
        file: PathBuf,
        #[arg(long)]
        partition_key: Option<String>,
    },
    /// Create dns records through the porkbun api.
    Dns {
        #[command(subcommand)]
        record: DnsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum DnsCommand {
    Cname {
        #[arg(long, env = "RECORD_NAME")]
        name: String,
        #[arg(long, env = "FRONTDOOR_ENDPOINT")]
        content: String,
        #[command(flatten)]
        common: DnsArgs,
    },
    Txt {
        #[arg(long, env = "DNS_SUBDOMAIN")]
        name: String,
        #[arg(long, env = "TXT_SECRET", hide_env_values = true)]
        content: String,
        #[command(flatten)]
        common: DnsArgs,
    },
}

#[derive(clap::Args, Debug)]
struct DnsArgs {
    #[arg(long, env = "DNS_DOMAIN")]
    domain: String,
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: String,
    #[arg(long, env = "SECRET_API_KEY", hide_env_values = true)]
    secret_api_key: String,
    #[arg(long, default_value = DEFAULT_TTL)]
    ttl: String,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long, default_value = PORKBUN_API_BASE)]
    api_base: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match ServerConfig::load(path.clone()).await {
            Ok(v) => v,
            Err(err) => {
                eprintln!("failed to load config from {path:?}: {err}");
                exit(-1);
            }
        },
        None => ServerConfig::default(),
    };
    init_logging(&config);

    if let Err(err) = run_command(config, args.command).await {
        error!("{err:#}");
        exit(-1);
    }
}

async fn run_command(config: ServerConfig, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Serve => {
            let counter = VisitorCounter::new(ProcessEnvironment, config.store.connector()?);
            let server = CounterServer::bind(&config, counter).await?;
            server.serve(async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    error!("failed to listen for shutdown signal: {err:?}");
                    std::future::pending::<()>().await;
                }
            }).await;
        },
        Command::Invoke { method } => {
            let method = method.to_uppercase().parse::<hyper::Method>()
                .map_err(|err| anyhow!("invalid http method {method:?}: {err}"))?;
            let request = HttpRequest::new()
                .with_method(method)
                .with_url(config.route.clone())?;
            let counter = VisitorCounter::new(ProcessEnvironment, config.store.connector()?);

            let response = tokio::task::spawn_blocking(move || counter.handle(&request)).await?;
            println!("{}", response.status);
            println!("{}", String::from_utf8_lossy(&response.body));
        },
        Command::Upload { file, partition_key } => {
            let documents = load_documents(&file, partition_key.as_deref())?;
            let settings = StoreSettings::from_env(&ProcessEnvironment)
                .context("Missing Cosmos DB URL or key in environment variables")?;
            let connector = config.store.connector()?;

            let written = tokio::task::spawn_blocking(move || -> anyhow::Result<usize> {
                let store = connector.connect(&settings)?;
                Ok(upload(&store, documents)?)
            }).await??;
            info!("uploaded {written} document(s) from {file:?}");
        },
        Command::Dns { record } => {
            let (record, common) = match record {
                DnsCommand::Cname { name, content, common } => (dns_record(RecordType::Cname, name, content, &common), common),
                DnsCommand::Txt { name, content, common } => (dns_record(RecordType::Txt, name, content, &common), common),
            };
            let client = PorkbunClient::new(common.api_base, PorkbunCredentials {
                api_key: common.api_key,
                secret_api_key: common.secret_api_key,
            });

            match client.create_record(&common.domain, &record).await? {
                CreateRecordOutcome::Created(body) => {
                    println!("API Response:");
                    println!("{}", serde_json::to_string_pretty(&body)?);
                },
                CreateRecordOutcome::Rejected { status, body } => {
                    println!("Error: {}", status.as_u16());
                    println!("{body}");
                    return Err(anyhow!("dns api rejected the record with status {status}"));
                },
            }
        },
    }

    Ok(())
}

fn dns_record(record_type: RecordType, name: String, content: String, common: &DnsArgs) -> DnsRecord {
    DnsRecord {
        record_type,
        name,
        content,
        ttl: common.ttl.clone(),
        notes: common.notes.clone(),
    }
}
