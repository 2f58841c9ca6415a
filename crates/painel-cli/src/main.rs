use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};
use clap::Parser;
use color_eyre::eyre::{Context, Result};
use painel_worker::config::{load_config, load_config_from_path};
use painel_worker::{
    ConversationStatus, MessageRole, PainelWorker, StatusSource, WorkerEvent, format_phone_number,
};

#[derive(Parser, Debug)]
#[command(name = "painel", about = "Multi-channel customer service dashboard")]
struct Args {
    /// Configuration file (defaults to the standard lookup)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Channel id or slug selected at startup
    #[arg(long)]
    channel: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .from_env_lossy()
                .add_directive("painel_cli=info".parse()?)
                .add_directive("painel_core=info".parse()?)
                .add_directive("painel_worker=info".parse()?)
                .add_directive("painel_db=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    }
    .wrap_err("Failed to load configuration")?;

    let mut worker = PainelWorker::new(&config)
        .await
        .wrap_err("Failed to create worker")?;

    let mut event_rx = worker
        .take_event_receiver()
        .ok_or_else(|| color_eyre::eyre::eyre!("Failed to get event receiver"))?;

    worker.start().await.wrap_err("Failed to start worker")?;

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            handle_event(event);
        }
    });

    let mut channel = worker
        .resolve_channel(args.channel.as_deref().unwrap_or_default())
        .id
        .clone();
    tracing::info!(channel_id = %channel, channels = worker.channels().len(), "Painel started");

    loop {
        print_menu(&worker, &channel);
        let choice = read_line("Choice: ")?;

        match choice.trim() {
            "1" => channel = select_channel(&worker)?,
            "2" => list_conversations(&worker, &channel).await?,
            "3" => show_conversation(&worker, &channel).await?,
            "4" => change_status(&worker, &channel).await?,
            "5" => show_counts(&worker, &channel).await?,
            "6" => reply(&worker, &channel).await?,
            "7" => simulate_inbound(&worker, &channel).await?,
            "8" => toggle_watch(&worker, &channel).await?,
            "9" => {
                let resolved = worker.sweep_now().await?;
                println!("🧹 Auto-resolved {} conversations", resolved);
            }
            "0" => {
                println!("👋 Shutting down...");
                worker.stop().await?;
                break;
            }
            _ => println!("❌ Invalid choice"),
        }
    }

    Ok(())
}

fn print_menu(worker: &PainelWorker, channel: &str) {
    let current = worker.resolve_channel(channel);
    println!();
    println!("╔════════════════════════════════════╗");
    println!("║      PAINEL - Atendimento          ║");
    println!("╠════════════════════════════════════╣");
    println!("║  1. Select Channel                 ║");
    println!("║  2. List Conversations             ║");
    println!("║  3. Show Conversation              ║");
    println!("║  4. Change Status                  ║");
    println!("║  5. Status Counts                  ║");
    println!("║  6. Reply                          ║");
    println!("║  7. Simulate Inbound Message       ║");
    println!("║  8. Watch / Unwatch Channel        ║");
    println!("║  9. Run Auto-Resolve Now           ║");
    println!("║  0. Exit                           ║");
    println!("╚════════════════════════════════════╝");
    println!("📍 Channel: {} ({})", current.display_name, current.table_name);
}

fn handle_event(event: WorkerEvent) {
    match event {
        WorkerEvent::ConversationsUpdated {
            channel_id,
            conversations,
        } => {
            println!(
                "\n🔄 {} conversations in {}",
                conversations.len(),
                channel_id
            );
        }
        WorkerEvent::NewMessage {
            phone_key, content, ..
        } => {
            println!(
                "\n💬 {}: {}",
                format_phone_number(&phone_key),
                content.as_deref().unwrap_or("[unreadable]")
            );
        }
        WorkerEvent::StatusChanged {
            conversation_id,
            status,
            ..
        } => {
            println!("\n✅ {} is now {}", conversation_id, status.label());
        }
        WorkerEvent::StatusWriteFailed {
            conversation_id,
            status,
            ..
        } => {
            println!(
                "\n⚠️  Could not save status {} for {}; kept locally only",
                status.label(),
                conversation_id
            );
        }
        WorkerEvent::SweepCompleted { resolved } => {
            if resolved > 0 {
                println!("\n🧹 Auto-resolved {} stale conversations", resolved);
            }
        }
        WorkerEvent::Error { channel_id, error } => {
            println!("\n❌ Error ({}): {}", channel_id.unwrap_or_default(), error);
        }
    }
}

fn select_channel(worker: &PainelWorker) -> Result<String> {
    println!("\n📋 Channels:");
    for channel in worker.channels() {
        println!("  {} - {} [{}]", channel.id, channel.display_name, channel.table_name);
    }

    let id = read_line("Channel id or slug: ")?;
    let channel = worker.resolve_channel(&id);
    println!("📍 Selected {}", channel.display_name);
    Ok(channel.id.clone())
}

async fn list_conversations(worker: &PainelWorker, channel: &str) -> Result<()> {
    let filter = read_line("Status filter (unread/in_progress/resolved, empty for all): ")?;

    let conversations = if filter.is_empty() {
        worker.get_conversations(channel).await?
    } else {
        let Some(status) = parse_status(&filter) else {
            return Ok(());
        };
        worker.get_conversations_by_status(channel, status).await?
    };

    if conversations.is_empty() {
        println!("📭 No conversations found");
        return Ok(());
    }

    println!("\n💬 Conversations ({}):", conversations.len());
    for view in conversations.iter().take(20) {
        let conv = &view.conversation;
        let unread = if conv.unread_count > 0 {
            format!(" 🔴 {}", conv.unread_count)
        } else {
            String::new()
        };
        println!(
            "  [{}] {} ({}) - {} | {}{}",
            view.status.label(),
            conv.contact_name,
            format_phone_number(&conv.phone_key),
            format_time(conv.last_message_time),
            preview(&conv.last_message),
            unread
        );
    }
    if conversations.len() > 20 {
        println!("  ... and {} more", conversations.len() - 20);
    }
    Ok(())
}

async fn show_conversation(worker: &PainelWorker, channel: &str) -> Result<()> {
    let phone = read_line("Phone: ")?;
    let messages = worker.get_conversation_messages(channel, &phone).await?;

    if messages.is_empty() {
        println!("📭 No messages found");
        return Ok(());
    }

    println!("\n💬 Messages ({}):", messages.len());
    for msg in &messages {
        let direction = match msg.role {
            MessageRole::Customer => "←",
            MessageRole::Agent => "→ 👤",
            _ => "→",
        };
        println!("  {} [{}] {}", direction, format_time(msg.created_at), msg.content);
    }

    let marked = worker.mark_conversation_read(channel, &phone).await?;
    if marked > 0 {
        println!("👁  Marked {} messages as read", marked);
    }
    Ok(())
}

async fn change_status(worker: &PainelWorker, channel: &str) -> Result<()> {
    let phone = read_line("Phone: ")?;
    let lookup = worker.lookup_status(channel, &phone).await;
    let source = match lookup.source {
        StatusSource::Backend => "saved",
        StatusSource::Cache => "local cache",
        StatusSource::Default => "default",
    };
    println!("Current: {} ({})", lookup.status.label(), source);
    if lookup.backend_unavailable {
        println!("⚠️  Status store unavailable, showing local value");
    }

    let input = read_line("New status (unread/in_progress/resolved): ")?;
    let Some(status) = parse_status(&input) else {
        return Ok(());
    };
    if worker.set_status(channel, &phone, status).await {
        println!("✅ Status updated");
    } else {
        println!("❌ Failed to save status");
    }
    Ok(())
}

async fn show_counts(worker: &PainelWorker, channel: &str) -> Result<()> {
    let counts = worker.get_status_counts(channel).await?;
    println!("\n📊 Status counts:");
    println!("  Total:       {}", counts.total);
    println!("  Pending:     {}", counts.pending);
    println!("  In progress: {}", counts.in_progress);
    println!("  Resolved:    {}", counts.resolved);
    Ok(())
}

async fn reply(worker: &PainelWorker, channel: &str) -> Result<()> {
    let phone = read_line("Phone: ")?;
    let text = read_line("Message: ")?;
    worker.send_reply(channel, &phone, &text).await?;
    println!("📤 Reply recorded!");
    Ok(())
}

async fn simulate_inbound(worker: &PainelWorker, channel: &str) -> Result<()> {
    let session = read_line("Session id: ")?;
    let name = read_line("Contact name (optional): ")?;
    let text = read_line("Message: ")?;

    let name = if name.is_empty() { None } else { Some(name.as_str()) };

    let row = worker.receive_message(channel, &session, &text, name).await?;
    println!("📥 Stored message #{}", row.id);
    Ok(())
}

async fn toggle_watch(worker: &PainelWorker, channel: &str) -> Result<()> {
    if worker.is_watching().await {
        worker.unwatch().await;
        println!("🔕 Stopped watching");
    } else {
        worker.watch_channel(channel).await?;
        println!("🔔 Watching for new messages");
    }
    Ok(())
}

fn parse_status(input: &str) -> Option<ConversationStatus> {
    match input.parse() {
        Ok(status) => Some(status),
        Err(e) => {
            println!("❌ {}", e);
            None
        }
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%d/%m %H:%M").to_string()
}

fn preview(text: &str) -> String {
    if text.chars().count() > 40 {
        format!("{}...", text.chars().take(40).collect::<String>())
    } else {
        text.to_string()
    }
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
