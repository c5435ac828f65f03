use clap::{Parser, Subcommand};
use pdf_rag::Result;
use pdf_rag::commands::{
    ask, delete_document, list_documents, purge_index, show_history, show_status, upload_document,
};
use pdf_rag::config::{Config, get_config_dir, run_interactive_config, show_config};
use pdf_rag::service::DEFAULT_SESSION_ID;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pdf-rag")]
#[command(about = "Ask questions about your PDF documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama, chunking and the language model
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Upload a PDF and index it
    Upload {
        /// Path to the PDF file
        file: PathBuf,
        /// Display name, defaults to the file name
        #[arg(long)]
        name: Option<String>,
    },
    /// List uploaded documents
    List,
    /// Delete a document and its indexed chunks
    Delete {
        /// Document ID
        id: i64,
    },
    /// Drop every indexed chunk, keeping registered documents
    Purge {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Ask a question over the uploaded documents
    Ask {
        query: String,
        /// Chat session the exchange is logged under
        #[arg(long, default_value = DEFAULT_SESSION_ID)]
        session: String,
    },
    /// Show the messages of a chat session
    History {
        session: String,
    },
    /// Show the status of every backing service
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = get_config_dir().map_err(|e| pdf_rag::RagError::Config(e.to_string()))?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Upload { file, name } => {
            upload_document(&Config::load(&config_dir)?, &file, name).await?;
        }
        Commands::List => {
            list_documents(&Config::load(&config_dir)?).await?;
        }
        Commands::Delete { id } => {
            delete_document(&Config::load(&config_dir)?, id).await?;
        }
        Commands::Purge { yes } => {
            purge_index(&Config::load(&config_dir)?, yes).await?;
        }
        Commands::Ask { query, session } => {
            ask(&Config::load(&config_dir)?, &query, &session).await?;
        }
        Commands::History { session } => {
            show_history(&Config::load(&config_dir)?, &session).await?;
        }
        Commands::Status => {
            show_status(&Config::load(&config_dir)?).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["pdf-rag", "list"]).expect("list parses");
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn upload_command_with_name() {
        let cli = Cli::try_parse_from(["pdf-rag", "upload", "manual.pdf", "--name", "Manual"])
            .expect("upload parses");
        match cli.command {
            Commands::Upload { file, name } => {
                assert_eq!(file, PathBuf::from("manual.pdf"));
                assert_eq!(name.as_deref(), Some("Manual"));
            }
            _ => panic!("expected upload"),
        }
    }

    #[test]
    fn ask_uses_default_session() {
        let cli = Cli::try_parse_from(["pdf-rag", "ask", "What is the refund policy?"])
            .expect("ask parses");
        match cli.command {
            Commands::Ask { query, session } => {
                assert_eq!(query, "What is the refund policy?");
                assert_eq!(session, "default");
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn delete_requires_numeric_id() {
        let cli = Cli::try_parse_from(["pdf-rag", "delete", "abc"]);
        assert!(cli.is_err());

        let cli = Cli::try_parse_from(["pdf-rag", "delete", "7"]).expect("delete parses");
        assert!(matches!(cli.command, Commands::Delete { id: 7 }));
    }

    #[test]
    fn purge_flag() {
        let cli = Cli::try_parse_from(["pdf-rag", "purge", "--yes"]).expect("purge parses");
        assert!(matches!(cli.command, Commands::Purge { yes: true }));
    }

    #[test]
    fn invalid_subcommand() {
        let cli = Cli::try_parse_from(["pdf-rag", "serve"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["pdf-rag", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
