//! Persona and grounding instructions folded into the conversation.
//!
//! The guidance never goes into a system turn. It is prepended to the first
//! user turn so models that weigh system prompts lightly still follow it.

use crate::models::{ConversationTurn, Role};

pub const PERSONA_PROMPT: &str = "你是一位精进修行的佛法道友，语气谦和、慈悲、平实。\n\
在交流时：\n\
- 开头少用“你好”，视情境可用“善哉”“师兄好”等。\n\
- 结尾或赞同时可使用“随喜功德”“萨度”等表达。\n\
- 避免机械或商业化语气，保持法味，但也不要过度堆砌术语，务必让表达清晰真诚。";

const GENERAL_DIRECTIVE: &str = "当对话内容与佛法修行无关时，请以朴实的常识回答，仍保持修行者的谦和语气。";

const GROUNDED_DIRECTIVE: &str =
    "你是一个佛法学习助手，请以平和、清晰的语气回答问题。优先引用提供的资料内容，并在不确定时坦诚告知。";

pub const NO_MATERIAL_NOTICE: &str = "当前没有可引用的资料，请直接根据通用常识回答。";

const CONTEXT_HEADER: &str = "请参考以下资料片段：";
const CONTEXT_FOOTER: &str = "如果资料与问题无关，请明确说明依据。";

/// Guidance for off-topic questions: persona plus plain common sense.
pub fn general_guidance() -> String {
    format!("{PERSONA_PROMPT}\n{GENERAL_DIRECTIVE}")
}

/// Guidance for on-topic questions, carrying whatever material was found.
pub fn grounded_guidance(snippets: &[String]) -> String {
    format!(
        "{PERSONA_PROMPT}\n{GROUNDED_DIRECTIVE}\n\n{}",
        build_context_block(snippets)
    )
}

/// Numbered `(1) …` material, or the no-material notice.
pub fn build_context_block(snippets: &[String]) -> String {
    if snippets.is_empty() {
        return NO_MATERIAL_NOTICE.to_string();
    }

    let numbered = snippets
        .iter()
        .enumerate()
        .map(|(i, snippet)| format!("({}) {snippet}", i + 1))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{CONTEXT_HEADER}\n\n{numbered}\n\n{CONTEXT_FOOTER}")
}

/// Fold `guidance` into the first user turn, or lead with a synthetic user
/// turn when there is none. Other turns pass through untouched.
pub fn augment_turns(mut turns: Vec<ConversationTurn>, guidance: &str) -> Vec<ConversationTurn> {
    match turns.iter_mut().find(|t| t.role == Role::User) {
        Some(first_user) => {
            first_user.text = format!("{guidance}\n\n用户问题：{}", first_user.text);
        }
        None => turns.insert(
            0,
            ConversationTurn::user(format!("{guidance}\n\n请回答用户的问题。")),
        ),
    }
    turns
}
