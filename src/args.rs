use clap::{Parser, Subcommand};

/// Shift cash-closure backend: expenses, payroll, reconciliations, closure.
#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the store and every configured sheet with its canonical headers
    Init,

    /// Run a single request and print the response envelope
    Call {
        /// Request JSON; read from stdin when omitted
        request: Option<String>,
    },

    /// Answer one JSON request per stdin line with one response line
    Serve,
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_with_inline_request() {
        let args = Args::try_parse_from(["cierre-caja", "call", r#"{"action":"ping"}"#]).unwrap();
        match args.command {
            Command::Call { request } => {
                assert_eq!(request.as_deref(), Some(r#"{"action":"ping"}"#))
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_serve_takes_no_arguments() {
        assert!(Args::try_parse_from(["cierre-caja", "serve", "extra"]).is_err());
    }
}
