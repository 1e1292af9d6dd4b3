//! Gyojeong, a backend-for-frontend serving automated writing feedback for
//! Korean learners.
//!
//! Given a composition (title + body), the service returns one paragraph of
//! holistic context feedback plus per-sentence grammar corrections with
//! explanations grounded in a curated grammar dictionary, and publishes one
//! best-effort event per corrected sentence for downstream collection.
//!
//! The core is the per-request fan-out in [`feedback::FeedbackFacade`]: a
//! context task and one grammar task per candidate sentence run
//! concurrently, each grammar task driving dense retrieval
//! ([`retrieval::vector`]), lexical fallback ([`retrieval::lexical`]), two
//! structured chat calls ([`llm`]), and a dictionary lookup
//! ([`dictionary`]). Per-task failures are isolated; the request succeeds
//! whenever sentence splitting does.

pub mod config;
pub mod dictionary;
pub mod events;
pub mod feedback;
pub mod llm;
pub mod logging;
pub mod morph;
pub mod retrieval;
pub mod sentence;
pub mod server;
pub mod types;
