//! Phenomine mining: talk to the concept-mining service and run curation
//! rounds over its answers.
//!
//! ```text
//!   MiningConfig ──► MiningClient ──(POST text)──► service
//!                         │ raw JSON
//!                         ▼
//!                    decode() ──► MinedConcept* (vocabulary filtered)
//!                         │
//!   CurationSession ◄─────┘ RoundToken-tagged message
//!        │
//!        ├─ ReviewRound: markup, present / NOT checkboxes
//!        └─ curated AnnotationSet, TreeNavigator focus
//! ```
//!
//! [`Miner`] is the seam between the session and the network;
//! [`MockMiner`] stands in for the service in tests.

pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod review;
pub mod session;

pub use client::{Miner, MiningClient, MockMiner};
pub use config::MiningConfig;
pub use decode::decode;
pub use error::{ConfigError, MiningError, SessionError};
pub use review::{ReviewRound, Signal};
pub use session::{CurationSession, RoundMessage, RoundToken, SessionEvent, SessionEventHandler};
