//! Generation request workflow.
//!
//! One user submission starts a sequence. The sequence runs in a single task:
//! request, interpret, and on a warming reply sleep for the suggested time and
//! request again, until the image arrives, the request fails, or the retry
//! budget runs out.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::catalog::{DEFAULT_MAX_RETRIES, WARMING_MESSAGE};
use crate::inference::{InferenceError, InferenceReply, InferenceTransport};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationSession {
    pub is_generating: bool,
    /// Zero means no retry is scheduled.
    pub retry_seconds_pending: f64,
    /// Warming or exhaustion notice. Empty when none.
    pub retry_error_message: String,
    /// Last non-retryable failure. Empty when none.
    pub error_message: String,
    pub retry_budget_remaining: u32,
    /// Prompt that produced `result_image`.
    pub last_submitted_prompt: String,
    pub result_image: String,
}

impl GenerationSession {
    pub fn idle(max_retries: u32) -> Self {
        Self {
            is_generating: false,
            retry_seconds_pending: 0.0,
            retry_error_message: String::new(),
            error_message: String::new(),
            retry_budget_remaining: max_retries,
            last_submitted_prompt: String::new(),
            result_image: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub warming_message: String,
    /// Retry right away when the server estimates zero seconds instead of
    /// treating zero as "no retry".
    pub retry_on_zero_estimate: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            warming_message: WARMING_MESSAGE.to_string(),
            retry_on_zero_estimate: false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("a generation is already in progress")]
    AlreadyGenerating,
}

enum Step {
    Done,
    RetryAfter(Duration),
}

#[derive(Clone)]
pub struct Generator {
    transport: Arc<dyn InferenceTransport>,
    session: Arc<Mutex<GenerationSession>>,
    policy: Arc<RetryPolicy>,
}

impl Generator {
    pub fn new(transport: Arc<dyn InferenceTransport>, policy: RetryPolicy) -> Self {
        let session = GenerationSession::idle(policy.max_retries);
        Self {
            transport,
            session: Arc::new(Mutex::new(session)),
            policy: Arc::new(policy),
        }
    }

    pub fn snapshot(&self) -> GenerationSession {
        self.lock().clone()
    }

    /// User-triggered entry. Blocked while a sequence is in flight; the
    /// sequence itself runs on a spawned task.
    pub fn submit(&self, prompt: String) -> Result<JoinHandle<()>, WorkflowError> {
        {
            let mut session = self.lock();
            if session.is_generating {
                return Err(WorkflowError::AlreadyGenerating);
            }
            session.is_generating = true;
            session.error_message.clear();
        }

        info!(prompt = %prompt, "generating");
        let this = self.clone();
        Ok(tokio::spawn(async move { this.drive(prompt).await }))
    }

    async fn drive(&self, prompt: String) {
        loop {
            let reply = self.transport.generate(&prompt).await;
            let delay = match self.apply_reply(&prompt, reply) {
                Step::Done => return,
                Step::RetryAfter(delay) => delay,
            };

            info!("trying again in {:.1} seconds", delay.as_secs_f64());
            tokio::time::sleep(delay).await;
            self.begin_retry();
        }
    }

    /// Timer-triggered entry. Skips the in-flight guard: the flag is still
    /// set from the attempt that asked for the retry.
    fn begin_retry(&self) {
        let mut session = self.lock();
        session.retry_budget_remaining = session.retry_budget_remaining.saturating_sub(1);
        session.retry_seconds_pending = 0.0;
        session.is_generating = true;
        debug!(
            budget = session.retry_budget_remaining,
            "resubmitting after warm-up delay"
        );
    }

    fn apply_reply(
        &self,
        prompt: &str,
        reply: Result<InferenceReply, InferenceError>,
    ) -> Step {
        let mut session = self.lock();
        match reply {
            Ok(InferenceReply::Image(image)) => {
                session.result_image = image;
                session.last_submitted_prompt = prompt.to_string();
                session.retry_error_message.clear();
                self.finish(&mut session);
                Step::Done
            }
            Ok(InferenceReply::Warming { estimated_time }) => {
                let seconds = if estimated_time.is_finite() && estimated_time > 0.0 {
                    estimated_time
                } else {
                    0.0
                };
                session.retry_seconds_pending = seconds;
                session.retry_error_message = self.policy.warming_message.clone();

                if seconds == 0.0 && !self.policy.retry_on_zero_estimate {
                    warn!("model is warming up but gave no wait estimate; no retry scheduled");
                    self.finish(&mut session);
                    return Step::Done;
                }

                if session.retry_budget_remaining == 0 {
                    let message = format!(
                        "Model still loading after {} retries. Try request again in 5 minutes.",
                        self.policy.max_retries
                    );
                    warn!("{message}");
                    session.retry_error_message = message;
                    self.finish(&mut session);
                    return Step::Done;
                }

                Step::RetryAfter(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX))
            }
            Ok(InferenceReply::Failed { status, error }) => {
                error!(status, "Error: {error}");
                session.error_message = error;
                session.retry_error_message.clear();
                self.finish(&mut session);
                Step::Done
            }
            Err(err) => {
                error!("Error: {err}");
                session.error_message = err.to_string();
                session.retry_error_message.clear();
                self.finish(&mut session);
                Step::Done
            }
        }
    }

    fn finish(&self, session: &mut GenerationSession) {
        session.is_generating = false;
        session.retry_seconds_pending = 0.0;
        session.retry_budget_remaining = self.policy.max_retries;
    }

    fn lock(&self) -> MutexGuard<'_, GenerationSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{Generator, RetryPolicy, WorkflowError};
    use crate::catalog::WARMING_MESSAGE;
    use crate::inference::{InferenceError, InferenceReply, InferenceTransport};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::{sleep, Instant};

    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<InferenceReply, InferenceError>>>,
        fallback: InferenceReply,
        calls: Mutex<Vec<(String, Instant)>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<InferenceReply>, fallback: InferenceReply) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().map(Ok).collect()),
                fallback,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(err: InferenceError) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::from([Err(err)])),
                fallback: image("unused"),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, Instant)> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl InferenceTransport for ScriptedTransport {
        async fn generate(&self, prompt: &str) -> Result<InferenceReply, InferenceError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push((prompt.to_string(), Instant::now()));
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or_else(|| Ok(self.fallback.clone()))
        }
    }

    fn image(url: &str) -> InferenceReply {
        InferenceReply::Image(url.to_string())
    }

    fn warming(seconds: f64) -> InferenceReply {
        InferenceReply::Warming {
            estimated_time: seconds,
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            ..RetryPolicy::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_stores_image_and_exact_prompt() {
        let transport = ScriptedTransport::new(vec![image("https://x/y.png")], image("unused"));
        let generator = Generator::new(transport.clone(), policy(20));

        generator
            .submit("Depict Nate as himself".to_string())
            .expect("submit")
            .await
            .expect("join");

        let session = generator.snapshot();
        assert!(!session.is_generating);
        assert_eq!(session.result_image, "https://x/y.png");
        assert_eq!(session.last_submitted_prompt, "Depict Nate as himself");
        assert!(session.retry_error_message.is_empty());
        assert_eq!(session.retry_budget_remaining, 20);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn warming_schedules_one_resubmission_after_delay() {
        let transport = ScriptedTransport::new(
            vec![warming(3.0), warming(3.0), image("https://x/y.png")],
            image("unused"),
        );
        let generator = Generator::new(transport.clone(), policy(20));
        let handle = generator.submit("p".to_string()).expect("submit");

        sleep(Duration::from_millis(2_999)).await;
        assert_eq!(transport.calls().len(), 1);
        let session = generator.snapshot();
        assert!(session.is_generating);
        assert_eq!(session.retry_seconds_pending, 3.0);
        assert_eq!(session.retry_error_message, WARMING_MESSAGE);
        assert_eq!(session.retry_budget_remaining, 20);

        sleep(Duration::from_millis(2)).await;
        assert_eq!(transport.calls().len(), 2);
        assert_eq!(generator.snapshot().retry_budget_remaining, 19);

        handle.await.expect("join");
        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(prompt, _)| prompt == "p"));
        assert!(calls[1].1 - calls[0].1 >= Duration::from_millis(3_000));
        assert!(calls[2].1 - calls[1].1 >= Duration::from_millis(3_000));

        let session = generator.snapshot();
        assert!(!session.is_generating);
        assert_eq!(session.result_image, "https://x/y.png");
        assert!(session.retry_error_message.is_empty());
        assert_eq!(session.retry_budget_remaining, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_stops_and_resets_counter() {
        let transport = ScriptedTransport::new(Vec::new(), warming(1.0));
        let generator = Generator::new(transport.clone(), policy(3));

        generator
            .submit("p".to_string())
            .expect("submit")
            .await
            .expect("join");

        // The first attempt plus one resubmission per unit of budget.
        assert_eq!(transport.calls().len(), 4);
        let session = generator.snapshot();
        assert!(!session.is_generating);
        assert_eq!(session.retry_budget_remaining, 3);
        assert_eq!(session.retry_seconds_pending, 0.0);
        assert!(session.retry_error_message.contains("after 3 retries"));

        sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn other_failures_are_not_retried() {
        let transport = ScriptedTransport::new(
            vec![InferenceReply::Failed {
                status: 500,
                error: "boom".to_string(),
            }],
            image("unused"),
        );
        let generator = Generator::new(transport.clone(), policy(20));

        generator
            .submit("p".to_string())
            .expect("submit")
            .await
            .expect("join");
        sleep(Duration::from_secs(60)).await;

        let session = generator.snapshot();
        assert!(!session.is_generating);
        assert_eq!(session.retry_budget_remaining, 20);
        assert_eq!(session.error_message, "boom");
        assert!(session.result_image.is_empty());
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_resolve_to_idle() {
        let transport = ScriptedTransport::failing(InferenceError::InvalidResponse(
            "response has no image".to_string(),
        ));
        let generator = Generator::new(transport.clone(), policy(20));

        generator
            .submit("p".to_string())
            .expect("submit")
            .await
            .expect("join");

        let session = generator.snapshot();
        assert!(!session.is_generating);
        assert_eq!(session.error_message, "response has no image");
    }

    #[tokio::test(start_paused = true)]
    async fn user_submission_is_blocked_while_in_flight() {
        let transport = ScriptedTransport::new(vec![warming(5.0)], image("https://x/y.png"));
        let generator = Generator::new(transport.clone(), policy(20));

        let handle = generator.submit("first".to_string()).expect("submit");
        assert_eq!(
            generator.submit("second".to_string()).err(),
            Some(WorkflowError::AlreadyGenerating)
        );

        sleep(Duration::from_secs(1)).await;
        assert_eq!(
            generator.submit("second".to_string()).err(),
            Some(WorkflowError::AlreadyGenerating)
        );

        handle.await.expect("join");
        assert!(transport.calls().iter().all(|(prompt, _)| prompt == "first"));
        generator
            .submit("third".to_string())
            .expect("idle again")
            .await
            .expect("join");
        assert_eq!(generator.snapshot().last_submitted_prompt, "third");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_estimate_schedules_no_retry_by_default() {
        let transport = ScriptedTransport::new(vec![warming(0.0)], image("https://x/y.png"));
        let generator = Generator::new(transport.clone(), policy(20));

        generator
            .submit("p".to_string())
            .expect("submit")
            .await
            .expect("join");
        sleep(Duration::from_secs(60)).await;

        let session = generator.snapshot();
        assert!(!session.is_generating);
        assert_eq!(session.retry_seconds_pending, 0.0);
        assert_eq!(session.retry_budget_remaining, 20);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_estimate_retries_immediately_when_enabled() {
        let transport = ScriptedTransport::new(vec![warming(0.0)], image("https://x/y.png"));
        let generator = Generator::new(
            transport.clone(),
            RetryPolicy {
                retry_on_zero_estimate: true,
                ..policy(20)
            },
        );

        generator
            .submit("p".to_string())
            .expect("submit")
            .await
            .expect("join");

        assert_eq!(transport.calls().len(), 2);
        assert_eq!(generator.snapshot().result_image, "https://x/y.png");
    }
}
