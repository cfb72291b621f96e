//! Interactive REPL
//!
//! One line in, one turn out. A turn runs to completion before the next
//! line is read; Ctrl-C while a turn is running abandons it and restores
//! the history.

use agent_core::{Agent, Session, ToolExecution, ToolInvocation, TurnOutcome};
use anyhow::{Context, Result};
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

/// What a line of input asks for
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Exit,
    Clear,
    Help,
    Empty,
    /// Anything else is sent to the model
    Turn(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        let input = line.trim();
        match input {
            "" => Self::Empty,
            "/clear" => Self::Clear,
            "/help" => Self::Help,
            _ if ["exit", "quit", "bye"]
                .iter()
                .any(|word| input.eq_ignore_ascii_case(word)) =>
            {
                Self::Exit
            }
            _ => Self::Turn(input),
        }
    }
}

/// Interactive chat session
pub struct Repl {
    agent: Agent,
    session: Session,
}

impl Repl {
    pub fn new(agent: Agent) -> Self {
        let session = agent.new_session();
        Self { agent, session }
    }

    /// Run the REPL main loop until an exit command, Ctrl-C or Ctrl-D
    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();

        let mut rl = DefaultEditor::new().context("failed to initialize line editor")?;

        loop {
            let line = match rl.readline(&format!("\n{} ", "You>".bright_green().bold())) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                Err(e) => return Err(e).context("failed to read input"),
            };

            let command = Command::parse(&line);
            if command != Command::Empty {
                let _ = rl.add_history_entry(line.trim());
            }

            match command {
                Command::Empty => {}
                Command::Exit => break,
                Command::Clear => {
                    self.session.reset();
                    tracing::debug!(session = %self.session.id, "history cleared");
                    println!("{}", "🧹 Conversation history cleared.".yellow());
                }
                Command::Help => print_help(),
                Command::Turn(input) => self.turn(input).await,
            }
        }

        println!("{}", "👋 Goodbye!".yellow());
        Ok(())
    }

    async fn turn(&mut self, input: &str) {
        println!("{}", "Thinking...".dimmed());

        let result = self
            .agent
            .run_turn_until(&mut self.session, input, interrupted())
            .await;

        match result {
            Some(Ok(outcome)) => show_outcome(&outcome),
            Some(Err(e)) => {
                println!("{} {}", "Error:".red().bold(), e.user_message().red());
            }
            None => println!("{}", "Interrupted. The turn was discarded.".yellow()),
        }
    }

    fn print_banner(&self) {
        let model = &self.agent.config().generation.model;
        println!();
        println!("{}", "🤖 Ollama Coding Agent".bright_blue().bold());
        println!("Model: {} via {}", model.as_str().cyan(), self.agent.provider_name());
        println!(
            "Type {}, {}, or {} to end the session.",
            "exit".yellow(),
            "quit".yellow(),
            "bye".yellow()
        );
        println!("Type {} to clear conversation history.", "/clear".yellow());
        println!("Type {} for available commands.", "/help".yellow());
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn print_help() {
    println!();
    println!("{}", "Available Commands:".bright_cyan());
    println!("  {:14} Show this help", "/help".yellow());
    println!("  {:14} Clear conversation history", "/clear".yellow());
    println!("  {:14} End the session", "exit | quit | bye".yellow());
    println!();
    println!("{}", "Model Tools:".bright_cyan());
    println!("  {:14} Read a file", "read_file".yellow());
    println!("  {:14} Create or overwrite a file", "write_to_file".yellow());
}

fn show_outcome(outcome: &TurnOutcome) {
    for execution in &outcome.executions {
        println!("{}", describe(execution));
    }
    if !outcome.reply.is_empty() {
        println!();
        println!("{}", "Assistant:".bright_blue().bold());
        println!("{}", outcome.reply);
    }
}

fn describe(execution: &ToolExecution) -> String {
    let path = execution.invocation.path();
    if !execution.result.is_success() {
        let name = execution.invocation.name();
        return format!("✗ {name} {path}: {}", execution.result.output())
            .red()
            .to_string();
    }
    match &execution.invocation {
        ToolInvocation::ReadFile { .. } => format!("📖 Read file: {path}").green().to_string(),
        ToolInvocation::WriteFile { .. } => {
            format!("💾 {}", execution.result.output()).green().to_string()
        }
    }
}
