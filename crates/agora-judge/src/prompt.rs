//! Prompt text sent to chat-completion judges.

use std::fmt::Write;

use crate::judge::JudgeRequest;

pub const SYSTEM_PROMPT: &str = r#"You are a professional debate judge. Score the debate using these criteria (100 points in total):

1. Argument quality (30 points): are the arguments clear, strong and logical?
2. Evidence (25 points): are facts, data or examples offered in support?
3. Rebuttal (20 points): does each side answer the other's points effectively?
4. Delivery (15 points): is the language fluent and persuasive?
5. Overall logic (10 points): is the line of reasoning complete and rigorous?

Reply with JSON in exactly this shape:
{
  "winner": "supporting" or "opposing" or "draw",
  "supporting_score": 0-100,
  "opposing_score": 0-100,
  "summary": "a detailed assessment covering the strengths and weaknesses of both sides"
}"#;

/// Render topic, both participants, and the transcript.
pub fn user_prompt(request: &JudgeRequest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Please judge the following debate.\n");
    let _ = writeln!(out, "Topic: {}\n", request.topic);
    let _ = writeln!(out, "Supporting: {}", request.supporting);
    let _ = writeln!(out, "Opposing: {}\n", request.opposing);
    let _ = writeln!(out, "Transcript:\n");
    for entry in &request.transcript {
        let _ = writeln!(
            out,
            "[Round {} - {}]\n{}\n",
            entry.round,
            entry.side.label(),
            entry.message.content
        );
    }
    out
}
