/// Chatline terminal client
use chatline_core::format::{format_time, thread_label};
use chatline_core::realtime::PusherTransport;
use chatline_core::utils::event_emitter::EventEmitter;
use chatline_core::{
    ChatApi, ChatError, ClientConfig, ConversationDeps, ConversationView, HttpChatApi, Message,
    UserSearch, ViewEvent,
};
use colored::Colorize;
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config = ClientConfig::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let api = Arc::new(HttpChatApi::new(&config)?);
    let user_id = match &config.user_id {
        Some(id) => id.clone(),
        None => api
            .current_user()
            .await
            .map_err(|e| anyhow::anyhow!("Not logged in: {}", e))?
            .id,
    };
    let peer_id = config
        .peer_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("peer id is required"))?;

    let transport = Arc::new(PusherTransport::connect(&config.pusher).await?);
    let deps = ConversationDeps::new(api.clone(), transport, &config);
    let mut view = ConversationView::open(&deps, user_id.clone(), peer_id.clone()).await?;
    let mut events = view.events();

    let search_events = EventEmitter::new(16);
    let search = UserSearch::new(api.clone(), config.search_debounce, search_events.clone());
    let mut search_results = search_events.subscribe();

    info!("Chatting with {} as {}", peer_id, user_id);
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&mut view, &search, api.as_ref(), line.trim_end()).await {
                    break;
                }
            }
            Ok(_) | Err(RecvError::Lagged(_)) = search_results.recv() => {
                print_search_results(&search).await
            }
            event = events.recv() => match event {
                Ok(event) => render_event(&view, event).await,
                Err(RecvError::Lagged(n)) => {
                    warn!("Skipped {} view events", n);
                    render_all(&view).await;
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    search.shutdown().await;
    view.close().await?;
    Ok(())
}

/// Returns false when the user asked to quit
async fn handle_line(
    view: &mut ConversationView,
    search: &UserSearch,
    api: &dyn ChatApi,
    line: &str,
) -> bool {
    let (command, arg) = match line.split_once(' ') {
        Some((c, a)) => (c, a.trim()),
        None => (line, ""),
    };

    let result = match command {
        "/quit" => return false,
        "/help" => {
            print_help();
            Ok(())
        }
        "/list" => {
            render_all(view).await;
            Ok(())
        }
        "/reply" => view.set_reply_target(Some(arg)).await,
        "/cancel" => view.set_reply_target(None).await,
        "/toggle" => match view.toggle_thread(arg).await {
            Some(_) => Ok(()),
            None => Err(ChatError::UnknownMessage(arg.to_string())),
        },
        "/chats" => api.conversations().await.map(|rows| {
            for row in rows {
                println!(
                    "{} {}  {}",
                    row.username.cyan().bold(),
                    format!("[{}]", row.id).dimmed(),
                    row.last_message.unwrap_or_default()
                );
            }
        }),
        "/search" => {
            search.set_query(arg).await;
            Ok(())
        }
        _ if line.trim().is_empty() => Ok(()),
        _ => {
            view.on_input().await;
            view.send(line).await
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
    }
    true
}

async fn render_event(view: &ConversationView, event: ViewEvent) {
    match event {
        ViewEvent::MessagesLoaded { .. } => render_all(view).await,
        ViewEvent::MessageAppended { message_id } => {
            if let Some(message) = view.message(&message_id).await {
                print_message(view, &message, false);
            }
        }
        ViewEvent::ReplyAppended {
            parent_id,
            reply_id,
            reply_count,
        } => {
            if view.is_expanded(&parent_id) {
                if let Some(reply) = view
                    .message(&parent_id)
                    .await
                    .and_then(|p| p.replies.into_iter().find(|r| r.id == reply_id))
                {
                    print_message(view, &reply, true);
                }
            } else {
                println!("  {} on {}", thread_label(reply_count, false).blue(), parent_id);
            }
        }
        ViewEvent::TypingChanged { typing } => {
            if !typing.is_empty() {
                println!("{}", format!("{} is typing…", typing.join(", ")).dimmed());
            }
        }
        ViewEvent::ThreadToggled { .. } => render_all(view).await,
        ViewEvent::ReplyTargetChanged { message_id } => match message_id {
            Some(id) => println!("{}", format!("Replying to {}", id).blue()),
            None => println!("{}", "Reply cancelled".dimmed()),
        },
        ViewEvent::SearchResultsChanged { .. } => {}
    }
}

async fn print_search_results(search: &UserSearch) {
    let results = search.results().await;
    if results.is_empty() {
        println!("{}", "No users found".dimmed());
    }
    for user in results {
        println!("{} {}", user.username.cyan().bold(), format!("[{}]", user.id).dimmed());
    }
}

async fn render_all(view: &ConversationView) {
    for message in view.messages().await {
        print_message(view, &message, false);
        if message.reply_count() > 0 {
            let expanded = view.is_expanded(&message.id);
            println!("  {}", thread_label(message.reply_count(), expanded).blue());
            if expanded {
                for reply in &message.replies {
                    print_message(view, reply, true);
                }
            }
        }
    }
}

fn print_message(view: &ConversationView, message: &Message, is_reply: bool) {
    let now = chrono::Utc::now();
    let indent = if is_reply { "    ↳ " } else { "" };
    let name = if message.sender_id == view.current_user_id() {
        "you".green().bold()
    } else {
        message.sender_name().cyan().bold()
    };
    println!(
        "{}{} {} {}  {}",
        indent,
        format_time(&message.created_at, &now).dimmed(),
        name,
        message.text,
        format!("[{}]", message.id).dimmed()
    );
}

fn print_help() {
    println!("Chatline");
    println!();
    println!("Type a line to send it. Commands:");
    println!("  /reply <message-id>   Reply to a message");
    println!("  /cancel               Stop replying");
    println!("  /toggle <message-id>  Expand or collapse replies");
    println!("  /list                 Redraw the conversation");
    println!("  /chats                List conversations");
    println!("  /search <username>    Find users");
    println!("  /quit                 Leave");
}
