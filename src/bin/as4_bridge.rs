use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use as4_bridge::directory::ResponsePModeOutput;
use as4_bridge::keystore::{list_certificates, KeytoolKeystore};
use as4_bridge::{
    fill_template, AttachmentUpload, BridgeConfig, Inbox, JsonPartnerDirectory, PModeActivator,
    Partner, RoutingMode, SecurityResolver, SubmissionRequest, Submitter, SystemClock,
};
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "as4-bridge", version, about = "Submit to and read from an AS4 gateway's message folders")]
struct Cli {
    /// JSON configuration file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a submission package into the outbox
    Submit {
        #[arg(long)]
        sender: String,
        #[arg(long)]
        receiver: String,
        #[arg(long)]
        service: String,
        #[arg(long)]
        action: String,
        #[arg(long)]
        conversation_id: Option<String>,
        #[arg(long)]
        message_id: Option<String>,
        #[arg(long, conflicts_with = "payload_file")]
        payload: Option<String>,
        #[arg(long)]
        payload_file: Option<PathBuf>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long, value_enum, default_value_t = RoutingMode::Push)]
        routing: RoutingMode,
        /// Attachment as PATH or PATH;CONTENT-TYPE (repeatable)
        #[arg(long = "attach")]
        attachments: Vec<String>,
    },
    /// Look up one inbound message by id
    Show { message_id: String },
    /// List every message in the inbox
    List,
    /// Copy an inbound attachment to a file or stdout
    Attachment {
        name: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Substitute address and responder party id into a template
    FillTemplate {
        #[arg(long)]
        template: PathBuf,
        #[arg(long)]
        address: String,
        #[arg(long)]
        party_id: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Manage the trading partner directory
    Partners {
        #[command(subcommand)]
        command: PartnerCommands,
    },
    /// List certificate and keystore files in a directory
    Certs { dir: PathBuf },
}

#[derive(Subcommand)]
enum PartnerCommands {
    List,
    Add {
        #[arg(long)]
        party_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        endpoint_url: String,
        #[arg(long)]
        keystore_alias: Option<String>,
    },
    Remove { party_id: String },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => BridgeConfig::default(),
    };

    match cli.command {
        Commands::Submit {
            sender,
            receiver,
            service,
            action,
            conversation_id,
            message_id,
            payload,
            payload_file,
            subject,
            routing,
            attachments,
        } => {
            let payload = match payload_file {
                Some(path) => fs::read_to_string(&path)
                    .with_context(|| format!("reading payload {}", path.display()))?,
                None => payload.unwrap_or_default(),
            };
            let attachments = attachments
                .iter()
                .map(String::as_str)
                .map(read_attachment)
                .collect::<Result<Vec<_>>>()?;
            let request = SubmissionRequest {
                sender,
                receiver,
                service,
                action,
                conversation_id,
                message_id,
                payload,
                subject,
                routing,
                attachments,
            };
            let receipt = submitter(&config)?.submit(request)?;
            print_json(&receipt)
        }
        Commands::Show { message_id } => {
            let message = inbox(&config)?.find_message(&message_id)?;
            print_json(&message)
        }
        Commands::List => {
            let summaries: Vec<_> = inbox(&config)?.list_messages()?.collect();
            info!("listed {} messages", summaries.len());
            print_json(&summaries)
        }
        Commands::Attachment { name, out } => {
            let mut download = inbox(&config)?.open_attachment(&name)?;
            match out {
                Some(path) => {
                    let mut file = fs::File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    io::copy(&mut download.file, &mut file)?;
                }
                None => {
                    let stdout = io::stdout();
                    let mut lock = stdout.lock();
                    io::copy(&mut download.file, &mut lock)?;
                    lock.flush()?;
                }
            }
            info!("{} ({} bytes)", download.content_disposition, download.len);
            Ok(())
        }
        Commands::FillTemplate {
            template,
            address,
            party_id,
            out,
        } => {
            let text = fs::read_to_string(&template)
                .with_context(|| format!("reading template {}", template.display()))?;
            let filled = fill_template(&text, &address, &party_id)?;
            match out {
                Some(path) => fs::write(&path, filled)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => print!("{filled}"),
            }
            Ok(())
        }
        Commands::Partners { command } => {
            let directory = partner_directory(&config)?;
            match command {
                PartnerCommands::List => print_json(&directory.list()?),
                PartnerCommands::Add {
                    party_id,
                    name,
                    endpoint_url,
                    keystore_alias,
                } => {
                    let partner = Partner {
                        party_id,
                        name,
                        endpoint_url,
                        keystore_alias,
                    };
                    directory.add(partner.clone())?;
                    print_json(&partner)
                }
                PartnerCommands::Remove { party_id } => print_json(&directory.remove(&party_id)?),
            }
        }
        Commands::Certs { dir } => print_json(&list_certificates(&dir)?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_attachment(spec: &str) -> Result<AttachmentUpload> {
    let (path, content_type) = match spec.split_once(';') {
        Some((path, content_type)) => (path, content_type.trim()),
        None => (spec, ""),
    };
    let path = Path::new(path);
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("attachment {spec} has no file name"))?
        .to_string();
    let data = fs::read(path).with_context(|| format!("reading attachment {}", path.display()))?;
    Ok(AttachmentUpload {
        file_name,
        content_type: content_type.to_string(),
        data,
    })
}

fn partner_directory(config: &BridgeConfig) -> Result<JsonPartnerDirectory> {
    let Some(path) = &config.partners_file else {
        bail!("partners_file is not configured");
    };
    let mut directory = JsonPartnerDirectory::new(path);
    if let (Some(template), Some(dir)) = (&config.response_pmode_template, &config.pmode_dir) {
        directory = directory.with_response_pmode(ResponsePModeOutput {
            template: template.clone(),
            dir: dir.clone(),
        });
    }
    Ok(directory)
}

fn submitter(config: &BridgeConfig) -> Result<Submitter> {
    let submitter = Submitter::new(config, Arc::new(SystemClock));
    let Some(routing) = &config.routing else {
        return Ok(submitter);
    };
    let directory = Arc::new(partner_directory(config)?);
    Ok(submitter.with_activator(PModeActivator::new(routing, directory)))
}

fn inbox(config: &BridgeConfig) -> Result<Inbox> {
    let inbox = Inbox::new(config);
    match (&config.keystore, &config.partners_file) {
        (Some(keystore), Some(_)) => {
            let resolver = SecurityResolver::new(
                Arc::new(partner_directory(config)?),
                Arc::new(KeytoolKeystore::new(keystore)),
            );
            Ok(inbox.with_security(resolver))
        }
        _ => Ok(inbox),
    }
}
