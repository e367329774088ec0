//! Comprobar: declarative, role-aware UI verification
//!
//! Comprobar (Spanish: "to verify") runs YAML scenarios against a browser:
//! navigate, sign in as a role, assert on logical UI references, interact and
//! capture evidence. Each run yields a structured report whose steps carry a
//! typed failure kind.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     COMPROBAR Architecture                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐             │
//! │   │ Scenario   │    │ Scenario   │    │ Driver     │             │
//! │   │ (YAML)     │───►│ Runner     │───►│ (chromium) │             │
//! │   └────────────┘    └─────┬──────┘    └────────────┘             │
//! │                           │                                      │
//! │         ┌─────────────────┼──────────────────┐                   │
//! │         ▼                 ▼                  ▼                   │
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐             │
//! │   │ Selector   │    │ Login      │    │ Report     │             │
//! │   │ Resolver   │    │ Machine    │    │ Sink       │             │
//! │   └────────────┘    └────────────┘    └────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use comprobar::{HarnessConfig, MemorySink, MockDriver, Scenario, ScenarioRunner};
//!
//! # async fn demo() -> comprobar::ComprobarResult<()> {
//! let scenario = Scenario::from_yaml(
//!     r"
//! name: landing
//! steps:
//!   - kind: navigate
//!     url: /
//!   - kind: assert_visible
//!     ref: teacher-entry
//! ",
//! )?;
//! let runner = ScenarioRunner::new(HarnessConfig::default())?;
//! let mut driver = MockDriver::school_library();
//! let mut sink = MemorySink::new();
//! let report = runner.run(&scenario, &mut driver, &mut sink).await;
//! println!("{}", report.summary_line());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Polling assertions over logical references
pub mod assertion;
/// Concurrent scenario batches
pub mod batch;
/// Screenshot and HTML evidence on disk
pub mod capture;
/// Chromium adapter over CDP
#[cfg(feature = "browser")]
pub mod chromium;
/// Harness settings
pub mod config;
/// Browser-agnostic driver contract
pub mod driver;
/// Login state machine and authenticator
pub mod login;
/// Scriptable in-memory driver
pub mod mock;
/// Step results, scenario reports and sinks
pub mod report;
/// Errors and failure kinds
pub mod result;
/// Scenario execution
pub mod runner;
/// Scenario documents
pub mod scenario;
/// Logical references and their selector strategies
pub mod selector;
/// Per-scenario run state
pub mod session;

pub use assertion::{AssertionEngine, Expectation, NotVisiblePolicy, Outcome};
pub use batch::{BatchRunner, DriverFactory};
pub use capture::ArtifactStore;
#[cfg(feature = "browser")]
pub use chromium::{ChromiumDriver, ChromiumFactory};
pub use config::HarnessConfig;
pub use driver::{
    ArtifactKind, ArtifactRef, BoundingBox, Driver, DriverConfig, ElementSnapshot, WaitCondition,
};
pub use login::{
    AuthRequest, Authenticator, LoginAttempt, LoginError, LoginMachine, LoginState, LoginTrigger,
    MachineReport,
};
pub use mock::MockDriver;
pub use report::{
    BatchReport, JsonSink, MemorySink, ReportSink, ScenarioReport, ScenarioStatus, StepOutcome,
    StepResult,
};
pub use result::{ComprobarError, ComprobarResult, FailureKind};
pub use runner::ScenarioRunner;
pub use scenario::{
    check_unique_slugs, load_scenarios, parse_scenarios, AuthMethod, Interaction, Role, Scenario,
    ScenarioError, Step, Variables,
};
pub use selector::{Selector, SelectorResolver, SelectorTable, UiRef};
pub use session::{LogicalView, Session};

/// Convenience re-exports for scenario authors and embedders
pub mod prelude {
    pub use super::assertion::*;
    pub use super::batch::*;
    pub use super::capture::*;
    #[cfg(feature = "browser")]
    pub use super::chromium::{ChromiumDriver, ChromiumFactory};
    pub use super::config::*;
    pub use super::driver::*;
    pub use super::login::{
        AuthRequest, Authenticator, LoginAttempt, LoginError, LoginMachine, LoginState,
    };
    pub use super::mock::MockDriver;
    pub use super::report::*;
    pub use super::result::*;
    pub use super::runner::*;
    pub use super::scenario::*;
    pub use super::selector::*;
    pub use super::session::*;
}
