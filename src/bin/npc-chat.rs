//! Interactive chat with an NPC backed by a locally hosted model server.
//!
//! This binary provides a streaming REPL: each line is said to the NPC, whose reply streams in
//! as it is generated.
//!
//! # Usage
//!
//! ```bash
//! # Talk to the default server with the default models
//! npc-chat
//!
//! # Give the NPC a backstory and use another server
//! npc-chat --backstory mira.txt --host http://gpu-box:11434
//!
//! # Disable colors (useful for piping output)
//! npc-chat --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/reset` - Forget the conversation
//! - `/host [url]` - Show or change the model server
//! - `/tier small|large` - Choose the model
//! - `/quit` - Exit the application
//!
//! Ctrl-C while the NPC is answering interrupts the reply.

use std::path::Path;
use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use colloquy::commands::{ChatCommand, help_text, parse_command};
use colloquy::config::{ChatArgs, ChatConfig};
use colloquy::prompt::SessionContext;
use colloquy::reply::extract_display_text;
use colloquy::settings::Settings;
use colloquy::{
    ChatClient, ChatRole, Conversation, ConversationView, PlainTextRenderer, SignalDispatcher,
    TurnOutcome,
};

/// Main entry point for the npc-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "colloquy=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("npc-chat [OPTIONS]");
    let config = ChatConfig::from(args);

    let mut settings = match Settings::load(&config.settings_path) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Ignoring unreadable settings: {err}");
            Settings::default()
        }
    };
    if let Some(host) = &config.host {
        settings.set_host(host.clone());
    }

    let client = Arc::new(ChatClient::new(config.client_options(settings.host()))?);
    let context = SessionContext::default();
    let model = settings
        .tier()
        .select(&config.small_model, &config.large_model)
        .to_string();
    let mut conversation = Conversation::new(client.clone(), model)
        .with_format(config.format())
        .with_policy(Box::new(context.clone()))
        .with_dispatcher(SignalDispatcher::new(Box::new(context.tracker())));
    if let Some(backstory) = config.backstory() {
        conversation = conversation.with_backstory(backstory);
    }

    let mut renderer = PlainTextRenderer::with_color(config.use_color);
    let mut rl = DefaultEditor::new()?;

    // Ctrl-C during a reply aborts it; at the prompt the line editor sees it first.
    let abort_client = client.clone();
    ctrlc::set_handler(move || {
        abort_client.abort();
    })?;

    println!(
        "NPC chat (model: {}, server: {})",
        conversation.model(),
        client.host()
    );
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                // Check for slash commands
                if let Some(cmd) = parse_command(line) {
                    if cmd.resets_conversation() {
                        conversation.reset();
                        conversation.take_refresh_pending();
                        renderer.refresh(conversation.history());
                    }
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Reset => {
                            renderer.print_info("Conversation reset.");
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {line}");
                            }
                        }
                        ChatCommand::Host(None) => {
                            renderer.print_info(&format!("Model server: {}", client.host()));
                        }
                        ChatCommand::Host(Some(host)) => match client.set_host(&host) {
                            Ok(()) => {
                                settings.set_host(client.host());
                                save_settings(&settings, &config.settings_path, &mut renderer);
                                let host = client.host();
                                renderer.print_info(&format!("Model server set to {host}"));
                            }
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::Tier(tier) => {
                            settings.set_tier(tier);
                            let model = tier.select(&config.small_model, &config.large_model);
                            conversation.set_model(model);
                            save_settings(&settings, &config.settings_path, &mut renderer);
                            renderer.print_info(&format!("Using the {tier} model ({model})."));
                        }
                        ChatCommand::Subject(index) => {
                            settings.set_subject_index(index);
                            save_settings(&settings, &config.settings_path, &mut renderer);
                            renderer.print_info(&format!("Subject set to {index}; starting over."));
                        }
                        ChatCommand::Difficulty(level) => {
                            context.set_difficulty(level);
                            renderer.print_info(&format!("Difficulty set to {level}."));
                        }
                        ChatCommand::Progress => {
                            for line in context.state().describe().lines() {
                                println!("    {line}");
                            }
                        }
                        ChatCommand::History => print_history(&conversation),
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                // Regular message - say it to the NPC
                match conversation.take_turn(line, &mut renderer).await {
                    TurnOutcome::Failed { error } => {
                        tracing::debug!(error = %error, "turn ended with an error");
                    }
                    TurnOutcome::Incomplete { .. } => {
                        renderer.print_info("(the reply was cut short)");
                    }
                    TurnOutcome::Completed { .. } | TurnOutcome::Ignored => {}
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        }
    }

    Ok(())
}

fn save_settings(settings: &Settings, path: &Path, renderer: &mut PlainTextRenderer) {
    if let Err(err) = settings.save(path) {
        renderer.print_error(&format!("Failed to save settings: {err}"));
    }
}

fn print_history(conversation: &Conversation) {
    let history = conversation.history();
    if history.is_empty() {
        println!("    (no messages)");
        return;
    }
    for message in history {
        let text = match message.role {
            ChatRole::Assistant => extract_display_text(&message.content),
            ChatRole::User | ChatRole::System => message.content.clone(),
        };
        println!("    {}: {}", message.role, text);
    }
}
