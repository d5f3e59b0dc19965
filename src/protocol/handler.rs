use std::ops::ControlFlow;

use tracing::debug;

use crate::sequences::{SequenceCodec, Term};
use crate::types::{LinkId, Result};

use super::{parse_line, Command};

/// Executes protocol lines against a [`SequenceCodec`] and produces the reply
/// lines.
#[derive(Clone)]
pub struct ProtocolHandler {
    sequences: SequenceCodec,
}

impl ProtocolHandler {
    /// Creates a handler.
    pub fn new(sequences: SequenceCodec) -> Self {
        Self { sequences }
    }

    /// Handles one line. Blank lines produce no reply.
    pub fn handle_line(&self, line: &str) -> Result<Vec<String>> {
        match parse_line(line) {
            None => Ok(Vec::new()),
            Some(Command::Create(elements)) => {
                let root = self.sequences.create(&elements)?;
                Ok(vec![format!(
                    "Sequence with balanced variant at {root} created."
                )])
            }
            Some(Command::Search(pattern)) => self.search(&pattern),
        }
    }

    fn search(&self, pattern: &[Term]) -> Result<Vec<String>> {
        let has_any = pattern.contains(&Term::Any);
        let has_star = pattern.contains(&Term::ZeroOrMany);
        let mut reply = Vec::new();

        if has_star {
            let matched = self.sequences.match_pattern(pattern)?;
            self.listing(&mut reply, "matched pattern", &matched)?;
            return Ok(reply);
        }

        let full = self.sequences.match_exact(pattern)?;
        self.listing(&mut reply, "matched fully", &full)?;
        if has_any {
            return Ok(reply);
        }

        let run: Vec<LinkId> = pattern.iter().filter_map(Term::link).collect();
        let mut partial = Vec::new();
        self.sequences.find_containing(&run, |root| {
            partial.push(root);
            Ok(ControlFlow::Continue(()))
        })?;
        self.listing(&mut reply, "matched partially", &partial)?;

        if full.is_empty() && partial.is_empty() {
            let connected = self.sequences.find_connections(pattern)?;
            self.listing(&mut reply, "connect query elements", &connected)?;
        }
        debug!(
            full = full.len(),
            partial = partial.len(),
            "protocol.search"
        );
        Ok(reply)
    }

    fn listing(&self, reply: &mut Vec<String>, label: &str, roots: &[LinkId]) -> Result<()> {
        reply.push(format!("{} sequences {label}.", roots.len()));
        for &root in roots {
            reply.push(format!("\t{root}: {}", self.sequences.format(root)?));
        }
        Ok(())
    }
}
