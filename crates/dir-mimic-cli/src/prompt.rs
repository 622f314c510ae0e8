use colored::*;
use dir_mimic_core::{Confirm, Operation, PlanReview};
use std::io::{self, BufRead, Write};
use std::sync::Mutex;

/// Shows the plan and its checksum on stdout and waits for a y/N answer on
/// stdin. Concurrent callers are served one at a time.
pub struct TerminalConfirm {
    terminal: Mutex<()>,
}

impl TerminalConfirm {
    pub fn new() -> Self {
        Self {
            terminal: Mutex::new(()),
        }
    }
}

impl Confirm for TerminalConfirm {
    fn confirm(&self, review: &PlanReview<'_>) -> io::Result<bool> {
        let _terminal = self
            .terminal
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let stdout = io::stdout();
        let mut out = stdout.lock();
        print_plan(&mut out, review)?;

        let stdin = io::stdin();
        let mut input = stdin.lock();
        let approved = prompt_confirm(&mut input, &mut out, "Execute this plan?", Some(false))?;
        if !approved {
            writeln!(out, "Aborted.")?;
        }
        Ok(approved)
    }
}

pub fn print_plan<W: Write>(out: &mut W, review: &PlanReview<'_>) -> io::Result<()> {
    let heavy = "=".repeat(60);
    let light = "-".repeat(60);

    writeln!(out)?;
    writeln!(out, "{}", heavy)?;
    writeln!(out, "{}", "PLAN TO EXECUTE".bold())?;
    writeln!(out, "{}", heavy)?;

    for op in review.operations {
        match op {
            Operation::Move { from, to } => {
                writeln!(out, "  {} {} -> {}", "MOVE:".yellow(), from, to)?
            }
            Operation::Copy { from, to } => {
                writeln!(out, "  {} {} -> {}", "COPY:".cyan(), from, to)?
            }
            Operation::Delete { from } => writeln!(out, "  {} {}", "DELETE:".red(), from)?,
            Operation::Missing { .. } => {}
        }
    }

    writeln!(out, "{}", light)?;
    writeln!(out, "Summary: {}", review.summary)?;
    writeln!(out, "Checksum: {}", review.digest.green())?;
    writeln!(out, "{}", light)?;
    Ok(())
}

/// Ask a yes/no question. End of input counts as the default answer, or as
/// "no" when there is none.
pub fn prompt_confirm<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
    default: Option<bool>,
) -> io::Result<bool> {
    let mut line = String::new();

    loop {
        line.clear();

        match default {
            Some(true) => write!(output, "{} (Y/n): ", prompt)?,
            Some(false) | None => write!(output, "{} (y/N): ", prompt)?,
        }
        output.flush()?;

        if input.read_line(&mut line)? == 0 {
            return Ok(default.unwrap_or(false));
        }

        match line.trim().to_uppercase().as_str() {
            "Y" | "YES" => return Ok(true),
            "N" | "NO" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dir_mimic_core::SealedPlan;
    use std::io::Cursor;

    fn answer(text: &str, default: Option<bool>) -> bool {
        let mut input = Cursor::new(text.as_bytes().to_vec());
        let mut output = Vec::new();
        prompt_confirm(&mut input, &mut output, "Go?", default).unwrap()
    }

    #[test]
    fn test_prompt_answers() {
        assert!(answer("y\n", Some(false)));
        assert!(answer("YES\n", Some(false)));
        assert!(!answer("n\n", Some(true)));
        assert!(!answer("\n", Some(false)));
        assert!(answer("\n", Some(true)));
        assert!(answer("maybe\ny\n", Some(false)));
        assert!(!answer("", None));
    }

    #[test]
    fn test_print_plan_shows_operations_and_checksum() {
        colored::control::set_override(false);
        let ops = vec![
            Operation::Move {
                from: "old/a.jpg".into(),
                to: "new/a.jpg".into(),
            },
            Operation::Delete {
                from: "old/b.jpg".into(),
            },
            Operation::Missing {
                from: "c.jpg".into(),
                size: 3,
            },
        ];
        let plan = SealedPlan::from_operations(&ops).unwrap();
        let review = PlanReview::new(&plan);

        let mut out = Vec::new();
        print_plan(&mut out, &review).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("MOVE: old/a.jpg -> new/a.jpg"));
        assert!(text.contains("DELETE: old/b.jpg"));
        assert!(!text.contains("c.jpg"));
        assert!(text.contains("Summary: 1 moves, 0 copies, 1 deletes, 1 missing"));
        assert!(text.contains(&format!("Checksum: {}", plan.digest())));
    }
}
