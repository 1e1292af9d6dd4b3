//! Holistic context feedback on the whole composition.
//!
//! One free-form chat call, fully isolated from the grammar pipeline. The
//! prompt forbids any mention of grammar, spelling, or spacing; those are
//! the grammar pipeline's business.

use std::sync::Arc;

use crate::llm::{ChatMessage, ChatParams, LlmError, LlmGateway};
use crate::types::ContextFeedback;

const SYSTEM_PROMPT_CONTEXT: &str = "\
당신은 한국어를 학습하는 외국인이 작성한 글에 대해 **전반적인 문맥 총평을** 제공하는 도우미이다.

한국어를 공부하는 외국인이 작성한 다음 글을 보고, 글에 대한 전반적인 피드백을 3~5문장으로 제공하라.

- 글의 제목이 글의 내용을 잘 드러내는가?
- 글의 내용이 문맥적으로 잘 구성되었는가?
- 특별히 칭찬할 부분이 있는가? 긍정적인 피드백을 녹여 서술하라.
- 앞으로의 글쓰기를 위한 제안을 한두 가지 덧붙여라.
- 글의 전체적인 인상만을 서술하라.
- 문법, 오타, 띄어쓰기와 같은 오류는 일절 언급해서는 안 된다.
- 글쓴이를 '학습자'라고 부르지 마라.
";

/// Produces the holistic context paragraph.
#[derive(Clone)]
pub struct ContextService {
    gateway: Arc<dyn LlmGateway>,
}

impl ContextService {
    /// Create a service over the shared gateway.
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self { gateway }
    }

    /// Generate context feedback for a composition.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] when the chat call fails; the caller substitutes
    /// a stub message.
    pub async fn create_context_feedback(
        &self,
        title: &str,
        contents: &str,
    ) -> Result<ContextFeedback, LlmError> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT_CONTEXT),
            ChatMessage::user(format!(
                "[제목]\n{title}\n\n[내용]\n{contents}\n\n위 글을 보고, 글에 대한 전반적인 피드백을 제공하라."
            )),
        ];

        let feedback = self.gateway.chat(&messages, ChatParams::default()).await?;
        Ok(ContextFeedback { feedback })
    }
}
