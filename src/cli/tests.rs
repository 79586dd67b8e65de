use super::*;
use crate::cli::settings::ConfigAction;
use clap::CommandFactory;

fn parse_args(argv: &[&str]) -> Args {
    Args::try_parse_from(argv)
        .unwrap_or_else(|err| panic!("argv={argv:?} should parse successfully: {err}"))
}

#[test]
fn cli_definition_is_consistent() {
    Args::command().debug_assert();
}

#[test]
fn chat_collects_message_words_after_options() {
    let argv = [
        "chatwire",
        "chat",
        "--model",
        "gpt-x",
        "-c",
        "c1",
        "--attach",
        "a.png",
        "--attach",
        "b.csv",
        "what",
        "is",
        "-1?",
    ];
    match parse_args(&argv).command {
        Commands::Chat {
            message,
            conversation,
            agent,
            model,
            attachments,
        } => {
            assert_eq!(message.join(" "), "what is -1?");
            assert_eq!(conversation.as_deref(), Some("c1"));
            assert_eq!(agent, None);
            assert_eq!(model.as_deref(), Some("gpt-x"));
            assert_eq!(
                attachments,
                vec![PathBuf::from("a.png"), PathBuf::from("b.csv")]
            );
        }
        _ => panic!("expected chat subcommand for argv={argv:?}"),
    }
}

#[test]
fn chat_requires_a_message() {
    assert!(Args::try_parse_from(["chatwire", "chat"]).is_err());
}

#[test]
fn base_url_is_global() {
    let args = parse_args(&["chatwire", "whoami", "--base-url", "http://other:8080"]);
    assert_eq!(args.base_url.as_deref(), Some("http://other:8080"));
    assert!(matches!(args.command, Commands::Whoami));
}

#[test]
fn conversations_flags() {
    match parse_args(&["chatwire", "conversations", "--take", "10", "--grouped"]).command {
        Commands::Conversations {
            take,
            all,
            grouped,
        } => {
            assert_eq!(take, Some(10));
            assert!(!all);
            assert!(grouped);
        }
        _ => panic!("expected conversations subcommand"),
    }
}

#[test]
fn rename_joins_title_words() {
    match parse_args(&["chatwire", "rename", "c1", "Trip", "to", "Oslo"]).command {
        Commands::Rename {
            conversation,
            title,
        } => {
            assert_eq!(conversation, "c1");
            assert_eq!(title.join(" "), "Trip to Oslo");
        }
        _ => panic!("expected rename subcommand"),
    }
}

#[test]
fn login_username_is_optional() {
    assert!(matches!(
        parse_args(&["chatwire", "login"]).command,
        Commands::Login { username: None }
    ));
    match parse_args(&["chatwire", "register", "ada", "--email", "ada@example.com"]).command {
        Commands::Register { username, email } => {
            assert_eq!(username.as_deref(), Some("ada"));
            assert_eq!(email.as_deref(), Some("ada@example.com"));
        }
        _ => panic!("expected register subcommand"),
    }
}

#[test]
fn a_subcommand_is_required() {
    assert!(Args::try_parse_from(["chatwire"]).is_err());
}

#[test]
fn config_without_action_shows_settings() {
    assert!(matches!(
        parse_args(&["chatwire", "config"]).command,
        Commands::Config { action: None }
    ));
}

#[test]
fn config_set_and_unset_take_a_key() {
    match parse_args(&["chatwire", "config", "set", "page-size", "20"]).command {
        Commands::Config { action } => assert_eq!(
            action,
            Some(ConfigAction::Set {
                key: "page-size".into(),
                value: "20".into()
            })
        ),
        _ => panic!("expected config subcommand"),
    }
    match parse_args(&["chatwire", "config", "unset", "default-model"]).command {
        Commands::Config { action } => assert_eq!(
            action,
            Some(ConfigAction::Unset {
                key: "default-model".into()
            })
        ),
        _ => panic!("expected config subcommand"),
    }
    assert!(Args::try_parse_from(["chatwire", "config", "set", "page-size"]).is_err());
}
