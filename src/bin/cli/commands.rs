/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Send { destination: String, body: String },
    Subscribe(String),
    Unsubscribe(String),
    Begin(String),
    Commit(String),
    Abort(String),
    Help,
    Quit,
    Empty,
}

/// Parse a prompt line. Returns a usage message for malformed input.
pub fn parse_command(line: &str) -> Result<Input, String> {
    let parts: Vec<&str> = line.trim().splitn(3, ' ').collect();
    let arg = |usage: &str| {
        parts
            .get(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("Usage: {}", usage))
    };

    match parts[0] {
        "" => Ok(Input::Empty),
        "quit" | "exit" | "q" => Ok(Input::Quit),
        "help" | "?" => Ok(Input::Help),
        "send" => {
            let usage = "send <destination> <message>";
            let destination = arg(usage)?;
            let body = parts
                .get(2)
                .map(|s| s.to_string())
                .ok_or_else(|| format!("Usage: {}", usage))?;
            Ok(Input::Send { destination, body })
        }
        "sub" | "subscribe" => Ok(Input::Subscribe(arg("sub <destination>")?)),
        "unsub" | "unsubscribe" => Ok(Input::Unsubscribe(arg("unsub <destination>")?)),
        "begin" => Ok(Input::Begin(arg("begin <transaction>")?)),
        "commit" => Ok(Input::Commit(arg("commit <transaction>")?)),
        "abort" => Ok(Input::Abort(arg("abort <transaction>")?)),
        other => Err(format!(
            "Unknown command: {}. Type 'help' for commands.",
            other
        )),
    }
}

/// Print help text
pub fn print_help() {
    println!("Commands:");
    println!("  send <destination> <message>  - Send a message");
    println!("  sub <destination>             - Subscribe to a destination");
    println!("  unsub <destination>           - Unsubscribe from a destination");
    println!("  begin <transaction>           - Begin a transaction");
    println!("  commit <transaction>          - Commit a transaction");
    println!("  abort <transaction>           - Abort a transaction");
    println!("  quit                          - Exit");
}
