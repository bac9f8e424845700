//! External content-generator interface.
//!
//! Everything the engine asks an LLM for (quizzes, exams, remedial lessons,
//! free-text grading) goes through [`ContentGenerator`]: a prompt plus a JSON
//! schema in, a structured JSON value out. Provider-specific failure shapes
//! stay behind [`GenerationError`]; callers always have a deterministic
//! fallback.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionNamedToolChoice, ChatCompletionRequestMessage, ChatCompletionTool,
        ChatCompletionToolChoiceOption, ChatCompletionToolType, CreateChatCompletionRequestArgs,
        FunctionName, FunctionObject,
    },
};
use schemars::{JsonSchema, SchemaGenerator};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::AiConfig;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("no structured output in response")]
    MissingOutput,
    #[error("response did not match schema: {0}")]
    Schema(String),
    #[error("generation timed out after {0}s")]
    Timeout(u64),
}

#[async_trait::async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate structured JSON matching `response_schema` from `prompt`.
    async fn generate(
        &self,
        prompt: &str,
        response_schema: Value,
    ) -> Result<Value, GenerationError>;
}

/// JSON schema for `T` with subschemas inlined, suitable as function-call
/// parameters.
pub fn schema_value<T: JsonSchema>() -> Value {
    let mut settings = schemars::r#gen::SchemaSettings::default();
    settings.inline_subschemas = true;
    settings.option_add_null_type = false;
    settings.option_nullable = false;
    let generator = SchemaGenerator::new(settings);
    serde_json::to_value(generator.into_root_schema_for::<T>()).unwrap_or(Value::Null)
}

/// Typed wrapper over [`ContentGenerator::generate`].
pub async fn generate_as<T>(
    generator: &dyn ContentGenerator,
    prompt: &str,
) -> Result<T, GenerationError>
where
    T: JsonSchema + DeserializeOwned,
{
    let value = generator.generate(prompt, schema_value::<T>()).await?;
    serde_json::from_value(value).map_err(|e| GenerationError::Schema(e.to_string()))
}

/// OpenAI-compatible generator. Structured output is obtained by forcing a
/// single function call whose parameters are the response schema.
pub struct AiContentGenerator {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl AiContentGenerator {
    pub fn new(config: AiConfig, timeout: Duration) -> Self {
        let client_config = OpenAIConfig::default()
            .with_api_base(config.base_url)
            .with_api_key(config.api_key);
        Self {
            client: Client::with_config(client_config),
            model: config.model,
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl ContentGenerator for AiContentGenerator {
    async fn generate(
        &self,
        prompt: &str,
        response_schema: Value,
    ) -> Result<Value, GenerationError> {
        let name = response_schema
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("structured_output")
            .to_string();
        let tool = ChatCompletionTool {
            r#type: ChatCompletionToolType::Function,
            function: FunctionObject {
                name: name.clone(),
                description: None,
                parameters: Some(response_schema),
                strict: None,
            },
        };
        let tool_choice = ChatCompletionToolChoiceOption::Named(ChatCompletionNamedToolChoice {
            r#type: ChatCompletionToolType::Function,
            function: FunctionName { name },
        });
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(vec![ChatCompletionRequestMessage::User(
                prompt.to_string().into(),
            )])
            .tools(vec![tool])
            .tool_choice(tool_choice)
            .build()
            .map_err(|e| GenerationError::Provider(e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| GenerationError::Provider(e.to_string()))?;

        let arguments = response
            .choices
            .first()
            .and_then(|choice| choice.message.tool_calls.as_ref())
            .and_then(|tool_calls| tool_calls.first())
            .ok_or(GenerationError::MissingOutput)?
            .function
            .arguments
            .clone();
        serde_json::from_str(&arguments).map_err(|e| GenerationError::Schema(e.to_string()))
    }
}

/// Canned generator for tests: responses are matched by prompt substring,
/// with an optional fixed default and a failure switch.
#[derive(Default)]
pub struct MockGenerator {
    responses: Mutex<HashMap<String, Value>>,
    default_response: Mutex<Option<Value>>,
    fail: AtomicBool,
    call_count: AtomicU32,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fixed_response(value: Value) -> Self {
        let mock = Self::default();
        *mock.default_response.lock().unwrap() = Some(value);
        mock
    }

    /// Always fails with a provider error.
    pub fn failing() -> Self {
        let mock = Self::default();
        mock.fail.store(true, Ordering::Relaxed);
        mock
    }

    pub fn insert_response(&self, prompt_fragment: &str, value: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(prompt_fragment.to_string(), value);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate(&self, prompt: &str, _schema: Value) -> Result<Value, GenerationError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if self.fail.load(Ordering::Relaxed) {
            return Err(GenerationError::Provider("mock failure".to_string()));
        }
        if let Some(value) = self
            .responses
            .lock()
            .unwrap()
            .iter()
            .find(|(fragment, _)| prompt.contains(fragment.as_str()))
            .map(|(_, v)| v.clone())
        {
            return Ok(value);
        }
        self.default_response
            .lock()
            .unwrap()
            .clone()
            .ok_or(GenerationError::MissingOutput)
    }
}

// ---- prompt builders ------------------------------------------------------

pub fn quiz_prompt(submodule_title: &str, content_summary: &str, user_level: &str) -> String {
    let content = if content_summary.is_empty() {
        format!("Core concepts of {submodule_title}")
    } else {
        content_summary.chars().take(2000).collect()
    };
    format!(
        "You are a quiz master for an educational platform. Create a knowledge test for the lesson: \"{submodule_title}\"\n\n\
        LESSON CONTENT THE LEARNER JUST STUDIED:\n{content}\n\n\
        USER LEVEL: {user_level}\n\n\
        Generate 5-7 smart questions that TEST THE LEARNER'S KNOWLEDGE of the content above.\n\
        A great question tests understanding rather than memorization, has plausible wrong \
        options (common misconceptions), and an explanation that teaches why the answer is \
        correct. Avoid feedback, opinion or meta questions, trivia with obvious answers, and \
        anything unrelated to the lesson. Each hint should nudge without giving the answer \
        away. Progress difficulty through the quiz. Create questions a {user_level} learner \
        would find appropriately challenging."
    )
}

pub fn exam_prompt(module_title: &str, content_summaries: &str, user_level: &str) -> String {
    let content: String = content_summaries.chars().take(3000).collect();
    format!(
        "You are an expert assessment designer. Create a rigorous, thought-provoking exam for module: \"{module_title}\"\n\n\
        USER LEVEL: {user_level}\n\n\
        CONTENT COVERED:\n{content}\n\n\
        Questions must test true understanding, not surface recall: include analyze, evaluate \
        and apply level questions, scenarios connecting multiple concepts, and plausible \
        distractors. Generate 8-12 questions: 4-6 multiple-choice (4 options each), 1-2 \
        multi-select, 1-2 short-answer, and 1-2 coding questions if the content involves \
        programming. Every question needs an explanation, two progressive hints (hint1 subtle, \
        hint2 more direct; each costs the learner 10%), and a difficulty of easy, medium or \
        hard. Calibrate for a {user_level} learner: challenging but fair."
    )
}

pub fn lesson_prompt(
    topic: &str,
    submodule_title: &str,
    user_level: &str,
    context: &str,
) -> String {
    let context = if context.is_empty() {
        String::new()
    } else {
        format!("\n\nCONTEXT: {context}")
    };
    format!(
        "You are an expert educator. Create a complete, engaging lesson for the submodule \
        \"{submodule_title}\" within a course on {topic}.{context}\n\n\
        USER LEVEL: {user_level}\n\n\
        Write a warm introduction, 2-5 focused topics with rich markdown content, a \
        comprehension question per topic where it helps, a handful of flashcards capturing the \
        key facts, and a short summary. Teach for understanding: concrete examples, plain \
        language, and real-world applications where the material supports them."
    )
}

pub fn grade_answer_prompt(question: &str, correct_answer: &str, student_answer: &str) -> String {
    format!(
        "Grade this student answer.\n\n\
        Question: {question}\n\
        Expected answer: {correct_answer}\n\
        Student's answer: {student_answer}\n\n\
        Evaluate how well the answer demonstrates understanding, whether key concepts are \
        correctly explained, and any misconceptions that should be addressed. Provide a score \
        (0-100) and brief, constructive feedback."
    )
}

pub fn remedial_content_prompt(
    submodule_title: &str,
    weak_areas: &[String],
    user_level: &str,
) -> String {
    let weak_list = if weak_areas.is_empty() {
        "general concepts".to_string()
    } else {
        weak_areas.join(", ")
    };
    format!(
        "A learner is struggling with \"{submodule_title}\", particularly: {weak_list}\n\n\
        Create comprehensive remedial content to help them master these concepts. This learner \
        didn't understand the first time, so use completely different explanations and \
        analogies than typical teaching, start simpler, break complex ideas into bite-sized \
        numbered steps, and build confidence with each small win. Generate 2-4 focused topics \
        with practice-friendly flashcards. Target {user_level} level but simpler than the \
        original content."
    )
}

pub fn remedial_module_prompt(
    module_title: &str,
    failed_topics: &[String],
    wrong_answers: &[String],
) -> String {
    let topics: String = failed_topics
        .iter()
        .map(|t| format!("- {t}\n"))
        .collect();
    let mistakes: String = wrong_answers
        .iter()
        .take(5)
        .map(|m| format!("- {m}\n"))
        .collect();
    format!(
        "Create a targeted review module for a student who failed the exam on: \"{module_title}\"\n\n\
        Topics they struggled with:\n{topics}\n\
        Their actual mistakes (reveals misconceptions):\n{mistakes}\n\
        Diagnose their misunderstandings and fix them with targeted teaching: address each \
        failed topic with its own submodule, reference and correct their specific mistakes, \
        use different examples than the original content, and keep each submodule focused like \
        a tutor session. Include practice questions that test exactly the concepts they got \
        wrong, with explanations of why the common wrong answer is wrong."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Answer {
        score: i64,
        feedback: String,
    }

    #[test]
    fn schema_carries_type_name_as_title() {
        let schema = schema_value::<Answer>();
        assert_eq!(schema["title"], "Answer");
        assert_eq!(schema["properties"]["score"]["type"], "integer");
    }

    #[tokio::test]
    async fn mock_matches_prompt_fragment() {
        let mock = MockGenerator::new();
        mock.insert_response(
            "Grade this student answer",
            serde_json::json!({"score": 85, "feedback": "solid"}),
        );
        let graded: Answer = generate_as(&mock, "Grade this student answer.\n\nQuestion: q")
            .await
            .unwrap();
        assert_eq!(graded.score, 85);
        assert_eq!(graded.feedback, "solid");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn mock_failure_is_a_provider_error() {
        let mock = MockGenerator::failing();
        let result = mock.generate("anything", Value::Null).await;
        assert!(matches!(result, Err(GenerationError::Provider(_))));
    }

    #[tokio::test]
    async fn schema_mismatch_is_reported() {
        let mock = MockGenerator::with_fixed_response(serde_json::json!({"score": "not a number"}));
        let result = generate_as::<Answer>(&mock, "anything").await;
        assert!(matches!(result, Err(GenerationError::Schema(_))));
    }
}
