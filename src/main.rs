use clap::{Arg, Command};
use log::LevelFilter;
use mail_intake::intake::IntakePipeline;
use mail_intake::message::{domain_part, InboundEnvelope};
use mail_intake::store::{
    Account, MemoryBlobStore, MemoryDirectory, MemoryMailStore, RolePolicy, StaticSettings,
};
use mail_intake::Settings;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("mail-intake")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inbound email intake pipeline: decode, filter, persist, relay")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Tenant settings file path")
                .default_value("/etc/mail-intake.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default settings file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the settings file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("eml")
                .long("eml")
                .value_name("FILE")
                .help("Run one raw message file through the pipeline against in-memory collaborators"),
        )
        .arg(
            Arg::new("rcpt")
                .long("rcpt")
                .value_name("ADDRESS")
                .help("Envelope recipient for --eml")
                .default_value("demo@example.com"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        match Settings::default().to_file(generate_path) {
            Ok(()) => println!("Default settings written to {generate_path}"),
            Err(e) => {
                eprintln!("Error writing settings: {e}");
                process::exit(1);
            }
        }
        return;
    }

    let config_path = matches.get_one::<String>("config").unwrap();
    let settings = match Settings::from_file(config_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading settings from {config_path}: {e}");
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        println!("Settings loaded from {config_path}");
        println!("  receive: {:?}", settings.receive);
        println!("  telegram relay: {:?}", settings.tg_bot_status);
        println!(
            "  relay destinations: {}",
            mail_intake::config::split_list(&settings.tg_chat_ids).len()
        );
        println!("  rule filter: {:?}", settings.rule_type);
        return;
    }

    let Some(eml_path) = matches.get_one::<String>("eml") else {
        eprintln!("Nothing to do: pass --eml FILE (and optionally --rcpt ADDRESS)");
        process::exit(1);
    };

    let raw = match std::fs::read(eml_path) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("Error reading {eml_path}: {e}");
            process::exit(1);
        }
    };

    let rcpt = matches.get_one::<String>("rcpt").unwrap().clone();

    // Demo collaborators: the recipient owns an account allowed to receive
    // on its own domain; everything persists in memory.
    let directory = MemoryDirectory::new().with_account(
        Account {
            account_id: 1,
            user_id: 1,
            email: rcpt.clone(),
            is_del: false,
        },
        RolePolicy {
            avail_domain: domain_part(&rcpt).to_string(),
            ..Default::default()
        },
    );
    let store = Arc::new(MemoryMailStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());

    let pipeline = IntakePipeline::new(
        Arc::new(StaticSettings(settings)),
        Arc::new(directory),
        store.clone(),
        Some(blobs.clone() as Arc<dyn mail_intake::store::BlobStore>),
    );

    pipeline
        .process(InboundEnvelope::from_bytes(rcpt, raw))
        .await;

    for row in store.rows() {
        println!(
            "email {}: status={} from={} subject={:?}",
            row.email_id,
            row.record.status.as_str(),
            row.record.send_email,
            row.record.subject
        );
    }
    for object in blobs.objects() {
        println!(
            "attachment: key={} size={} inline={}",
            object.key,
            object.size,
            object.content_id.is_some()
        );
    }
}
