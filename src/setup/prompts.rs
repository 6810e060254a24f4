// Prompt detection for the scripted setup interaction
use super::SetupAnswers;

/// Keep at most this much unanswered output around while waiting for a prompt
const MAX_PENDING: usize = 4096;

/// A prompt line ends in one of these once trailing whitespace is gone
const PROMPT_TERMINATORS: &[char] = &[':', '?', ']', ')', '>'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Moniker,
    Confirm,
    Passphrase,
}

struct PromptRule {
    needles: &'static [&'static str],
    answer: Answer,
}

const RULES: &[PromptRule] = &[
    PromptRule {
        needles: &["moniker", "node name", "enter name"],
        answer: Answer::Moniker,
    },
    PromptRule {
        needles: &["y/n", "yes/no", "continue?"],
        answer: Answer::Confirm,
    },
    PromptRule {
        needles: &["passphrase", "password"],
        answer: Answer::Passphrase,
    },
];

/// Watches the wizard's output and decides what to type back.
///
/// The wizard blocks after printing a prompt, so at most one prompt is
/// pending at a time and it is the last line printed. Only that line is
/// considered, and only if it ends like a question, so log output such as
/// "using moniker x" is never answered. Once a prompt is answered the
/// buffered output is discarded, which keeps a prompt like
/// "node name (moniker)" from being answered twice.
pub struct PromptResponder<'a> {
    answers: &'a SetupAnswers,
    pending: String,
}

impl<'a> PromptResponder<'a> {
    pub fn new(answers: &'a SetupAnswers) -> Self {
        Self {
            answers,
            pending: String::new(),
        }
    }

    /// Feed a chunk of output, returning the reply line if a prompt is now visible
    pub fn feed(&mut self, chunk: &str) -> Option<String> {
        self.pending.push_str(&chunk.to_lowercase());

        match self.prompt() {
            Some(answer) => {
                self.pending.clear();
                Some(format!("{}\n", self.reply(answer)))
            }
            None => {
                self.trim_pending();
                None
            }
        }
    }

    /// The rule matching the last non-empty line, if that line reads as a prompt
    fn prompt(&self) -> Option<Answer> {
        let line = self
            .pending
            .lines()
            .rev()
            .map(str::trim_end)
            .find(|l| !l.is_empty())?;

        if !line.ends_with(PROMPT_TERMINATORS) {
            return None;
        }

        RULES
            .iter()
            .filter_map(|rule| {
                rule.needles
                    .iter()
                    .filter_map(|needle| line.find(needle))
                    .min()
                    .map(|pos| (pos, rule.answer))
            })
            .min_by_key(|(pos, _)| *pos)
            .map(|(_, answer)| answer)
    }

    fn reply(&self, answer: Answer) -> &str {
        match answer {
            Answer::Moniker => self.answers.moniker.as_str(),
            Answer::Confirm => "y",
            Answer::Passphrase => self.answers.passphrase.as_str(),
        }
    }

    fn trim_pending(&mut self) {
        if self.pending.len() > MAX_PENDING {
            let mut cut = self.pending.len() - MAX_PENDING;
            while !self.pending.is_char_boundary(cut) {
                cut += 1;
            }
            self.pending.drain(..cut);
        }
    }
}
