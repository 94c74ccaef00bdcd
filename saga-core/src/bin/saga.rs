//! Terminal front end for a saga.
//!
//! A line-oriented protocol:
//! - A bare number plays that choice
//! - Lines starting with `#` are commands (save, rules, retry, quit, ...)
//! - Anything else is sent as the player's action
//!
//! ```bash
//! cargo run -p saga-core --bin saga -- --genre Wuxia --name Minh --goal
//! cargo run -p saga-core --bin saga -- --load saga-Minh-1700000000.json
//! ```

use saga_core::config::ActionLexicon;
use saga_core::persist::save_file_name;
use saga_core::{CustomRule, GameSession, SessionConfig, SessionError, TurnOutcome, WorldData};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

type Session = GameSession<gemini::Gemini>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let mut config = SessionConfig::new();
    if let Some(model) = arg_value(&args, "--model") {
        config = config.with_model(model);
    }
    if args.iter().any(|a| a == "--vi") {
        config = config.with_lexicon(ActionLexicon::vietnamese());
    }

    let mut session = match arg_value(&args, "--load") {
        Some(path) => {
            let client = gemini::Gemini::from_env()
                .map_err(|_| SessionError::NoApiKey)?
                .with_model(&config.model);
            let session = Session::load(client, path, config).await?;
            println!("[LOADED] {path}");
            for line in session.story_log().iter().rev().take(3).rev() {
                println!("{line}\n");
            }
            print_choices(session.choices());
            session
        }
        None => {
            let world = world_from_args(&args);
            let mut session = Session::from_env(world, config)?;
            println!("[PROCESSING]");
            match session.begin().await {
                Ok(outcome) => print_outcome(&outcome),
                Err(e) => println!("[ERROR] {e}"),
            }
            session
        }
    };

    println!("Enter your actions (one per line), #help for commands:");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('#') {
            if !run_command(&mut session, command).await {
                break;
            }
            std::io::stdout().flush().ok();
            continue;
        }

        let result = match line.parse::<usize>() {
            Ok(n) if n >= 1 => session.choose(n - 1).await,
            _ => session.player_action(line).await,
        };
        report(result);
    }

    Ok(())
}

/// Run one `#` command. Returns false to quit.
async fn run_command(session: &mut Session, command: &str) -> bool {
    let (name, rest) = command
        .trim()
        .split_once(char::is_whitespace)
        .map(|(n, r)| (n, r.trim()))
        .unwrap_or((command.trim(), ""));

    match name {
        "quit" | "exit" => {
            println!("Goodbye!");
            return false;
        }
        "save" => {
            let path = if rest.is_empty() {
                save_file_name(&session.state().world_data.character_name)
            } else {
                rest.to_string()
            };
            match session.save(&path).await {
                Ok(()) => println!("[SAVED] {path}"),
                Err(e) => println!("[ERROR] Save failed: {e}"),
            }
        }
        "retry" => report(session.retry().await),
        "suggest" => match session.suggest_action().await {
            Ok(suggestion) => println!("[SUGGEST] {suggestion}"),
            Err(e) => println!("[ERROR] {e}"),
        },
        "style" => report(session.change_writing_style(rest).await),
        "status" => print_status(session),
        "memories" => {
            for (i, memory) in session.state().memories.iter().enumerate() {
                let pin = if memory.pinned { "*" } else { " " };
                println!("  {}{} {}", i + 1, pin, memory.text);
            }
        }
        "pin" => {
            let toggled = rest
                .parse::<usize>()
                .ok()
                .filter(|n| *n >= 1)
                .is_some_and(|n| session.toggle_memory_pin(n - 1));
            if toggled {
                println!("[PINNED] memory {rest} toggled");
            } else {
                println!("[ERROR] Usage: #pin <memory number>");
            }
        }
        "rules" => {
            for rule in session.state().custom_rules.iter() {
                let mark = if rule.is_active { "on " } else { "off" };
                println!("  [{mark}] {} {}", rule.id, rule.content);
            }
        }
        "rule" => edit_rules(session, rest).await,
        "help" => print_commands(),
        _ => println!("[ERROR] Unknown command. Type #help for help."),
    }
    true
}

/// `#rule add <text>`, `#rule on <id>`, `#rule off <id>`.
async fn edit_rules(session: &mut Session, args: &str) {
    let (verb, arg) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
    let arg = arg.trim();
    let mut rules = session.state().custom_rules.clone();
    let changed = match verb {
        "add" if !arg.is_empty() => {
            rules.push(CustomRule::new(arg));
            true
        }
        "on" => rules.activate(arg),
        "off" => rules.deactivate(arg),
        _ => false,
    };
    if !changed {
        println!("[ERROR] Usage: #rule add <text> | #rule on <id> | #rule off <id>");
        return;
    }
    match session.save_rules(rules).await {
        Ok(Some(line)) => println!("{line}\n"),
        Ok(None) => println!("[RULES] No change"),
        Err(e) => println!("[ERROR] {e}"),
    }
}

fn report(result: Result<TurnOutcome, SessionError>) {
    match result {
        Ok(outcome) => print_outcome(&outcome),
        Err(SessionError::Turn(e)) => {
            println!("[ERROR] {e}");
            println!("Type #retry to send the same action again.");
        }
        Err(e) => println!("[ERROR] {e}"),
    }
}

fn print_outcome(outcome: &TurnOutcome) {
    println!();
    for para in outcome.story.split("\n\n") {
        println!("{para}");
    }
    println!();
    print_choices(&outcome.choices);
}

fn print_choices(choices: &[String]) {
    for (i, choice) in choices.iter().enumerate() {
        println!("  {}. {choice}", i + 1);
    }
}

fn print_status(session: &Session) {
    let state = session.state();
    println!("[STATUS]");
    if let Some(pc) = state.pc() {
        println!("  Character: {} ({})", pc.name, pc.realm.as_deref().unwrap_or("unknown realm"));
    }
    println!("  Turn: {}", state.turn_count);
    println!("  Tokens: {} (last call {})", state.total_tokens_used, state.last_call_tokens);
    let statuses: Vec<String> = state
        .statuses
        .iter()
        .map(|s| format!("{} on {}", s.name, s.owner))
        .collect();
    if !statuses.is_empty() {
        println!("  Statuses: {}", statuses.join(", "));
    }
    for quest in state.quests.active() {
        println!("  Quest: {}", quest.title);
    }
    let party: Vec<&str> = state.party_members().iter().map(|e| e.name.as_str()).collect();
    println!("  Party: {}", party.join(", "));
}

fn world_from_args(args: &[String]) -> WorldData {
    let genre = arg_value(args, "--genre").unwrap_or("Fantasy");
    let name = arg_value(args, "--name").unwrap_or("");
    let mut world = WorldData::new(genre, name)
        .with_goal(args.iter().any(|a| a == "--goal"))
        .with_nsfw(args.iter().any(|a| a == "--nsfw"));
    if let Some(detail) = arg_value(args, "--detail") {
        world = world.with_detail(detail);
    }
    if let Some(bio) = arg_value(args, "--bio") {
        world = world.with_bio(bio);
    }
    if let Some(gender) = arg_value(args, "--gender") {
        world = world.with_gender(gender);
    }
    world
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn print_commands() {
    println!("[HELP]");
    println!("  <number>            - Play that choice");
    println!("  #retry              - Resend the last failed action");
    println!("  #suggest            - Ask for a suggested action");
    println!("  #style <guide>      - Change the narration style");
    println!("  #status             - Show character, quests and party");
    println!("  #memories           - List memories (* = pinned)");
    println!("  #pin <n>            - Pin or unpin memory n");
    println!("  #rules              - List world rules");
    println!("  #rule add|on|off .. - Edit world rules");
    println!("  #save [path]        - Save the game");
    println!("  #quit               - Exit");
    println!("  (anything else is sent as the player's action; end it with 'nsfw' for mature content)");
}

fn print_help() {
    println!("saga - play an LLM-narrated role-playing adventure in the terminal");
    println!();
    println!("USAGE:");
    println!("  saga [--genre <g>] [--name <n>] [--detail <d>] [--bio <b>] [--gender <g>] [--goal] [--nsfw]");
    println!("  saga --load <save.json>");
    println!();
    println!("OPTIONS:");
    println!("  --model <id>  Gemini model (default gemini-2.5-flash)");
    println!("  --vi          Recognise Vietnamese command words");
    println!();
    println!("Keys are read from GEMINI_API_KEYS (comma-separated) or GEMINI_API_KEY, or a .env file.");
}
