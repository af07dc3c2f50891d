//! User behavior profiles: weighted task mixes run by every simulated user.
//!
//! A [`Scenario`] bundles a set of [`Task`]s with relative weights and an optional seeding step.
//! Each simulated user owns a [`UserState`] which carries its RNG and private counters, so no
//! mutable state is ever shared between users.

use std::fmt;
use std::ops::RangeInclusive;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::Distribution;
use rand_distr::weighted::WeightedIndex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::product::Product;
use crate::request::{Check, Request};

/// Search terms used by the search scenario, based on real catalog names and categories.
pub const SEARCH_TERMS: [&str; 20] = [
    "beauty",
    "fragrances",
    "furniture",
    "groceries",
    "chicken",
    "apple",
    "mascara",
    "lipstick",
    "calvin",
    "chanel",
    "gucci",
    "bed",
    "sofa",
    "table",
    "steak",
    "cat",
    "dog",
    "powder",
    "mirror",
    "cherry",
];

/// Products written during seeding, and the only ones read back afterwards.
pub const SEED_IDS: RangeInclusive<u64> = 1..=10;

/// Identifiers of randomized writes in the mixed scenario. Disjoint from [`SEED_IDS`].
pub const RANDOM_WRITE_IDS: RangeInclusive<u64> = 11..=10_000;

/// Offset added to the per-user counter of write-only users.
pub const WRITE_ID_BASE: u64 = 10_000;

const SEED_NAME: &str = "POST /products/:id/details (seed)";

/// Errors raised when assembling a [`Scenario`].
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The scenario has no tasks to choose from.
    #[error("scenario `{0}` has no tasks")]
    NoTasks(String),
    /// A task has a weight of zero and could never run.
    #[error("task `{task}` in scenario `{scenario}` has zero weight")]
    ZeroWeight {
        /// Name of the scenario.
        scenario: String,
        /// Display name of the task.
        task: &'static str,
    },
    /// The weights cannot be turned into a distribution, e.g. because their sum overflows.
    #[error("invalid weights in scenario `{scenario}`: {reason}")]
    InvalidWeights {
        /// Name of the scenario.
        scenario: String,
        /// Description of the problem.
        reason: String,
    },
}

/// The request a [`Task`] issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Read one of the seeded products and verify its identifier.
    GetProduct,
    /// Write a randomized product with an identifier outside of the seeded range.
    PostProduct,
    /// Write a constant product under the next identifier of the user's counter.
    PostSequential,
    /// Search for a random term of [`SEARCH_TERMS`].
    Search,
    /// Request the health endpoint.
    Health,
}

/// One weighted entry of a [`Scenario`].
#[derive(Clone, Debug)]
pub struct Task {
    /// Display name used to group results.
    pub name: &'static str,
    /// Relative weight. A task with weight 3 runs three times as often as one with weight 1.
    pub weight: u32,
    /// What the task does.
    pub action: Action,
}

impl Task {
    /// Creates a new task.
    pub fn new(name: &'static str, weight: u32, action: Action) -> Self {
        Self {
            name,
            weight,
            action,
        }
    }

    /// Builds the concrete request for this task, advancing the user's private state.
    pub fn prepare(&self, state: &mut UserState) -> Request {
        match self.action {
            Action::GetProduct => {
                let id = state.rng.random_range(SEED_IDS);
                Request::get(self.name, format!("/products/{id}"), Check::Product { id })
            }
            Action::PostProduct => {
                let product = Product::random(RANDOM_WRITE_IDS, &mut state.rng);
                Request::post_product(self.name, product)
            }
            Action::PostSequential => {
                let id = state.next_write_id();
                Request::post_product(self.name, Product::bulk(id))
            }
            Action::Search => {
                let term = SEARCH_TERMS[state.rng.random_range(0..SEARCH_TERMS.len())];
                Request::get(
                    self.name,
                    format!("/products/search?q={term}"),
                    Check::Status(StatusCode::OK),
                )
            }
            Action::Health => Request::get(self.name, "/health", Check::Status(StatusCode::OK)),
        }
    }
}

/// Private state of a single simulated user.
#[derive(Debug)]
pub struct UserState {
    /// The RNG driving all random choices of this user.
    rng: SmallRng,
    /// Number of sequential writes issued so far.
    write_counter: u64,
}

impl UserState {
    /// Creates the state for a new user from a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            write_counter: 0,
        }
    }

    /// Returns the next identifier for sequential writes.
    ///
    /// Identifiers start right after [`WRITE_ID_BASE`] and strictly increase.
    pub fn next_write_id(&mut self) -> u64 {
        self.write_counter += 1;
        self.write_counter + WRITE_ID_BASE
    }

    /// Gives access to the user's RNG.
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }
}

/// A builder for creating a [`Scenario`].
#[derive(Debug)]
pub struct ScenarioBuilder {
    name: String,
    tasks: Vec<Task>,
    seeded: bool,
}

impl ScenarioBuilder {
    /// Adds a task with the given display name, weight and action.
    pub fn task(mut self, name: &'static str, weight: u32, action: Action) -> Self {
        self.tasks.push(Task::new(name, weight, action));
        self
    }

    /// Whether users write the seed products before starting their task loop.
    pub fn seeded(mut self, seeded: bool) -> Self {
        self.seeded = seeded;
        self
    }

    /// Validates the weights and creates the scenario.
    pub fn build(self) -> Result<Scenario, ScenarioError> {
        if self.tasks.is_empty() {
            return Err(ScenarioError::NoTasks(self.name));
        }
        if let Some(task) = self.tasks.iter().find(|task| task.weight == 0) {
            return Err(ScenarioError::ZeroWeight {
                scenario: self.name,
                task: task.name,
            });
        }

        let distribution = WeightedIndex::new(self.tasks.iter().map(|task| task.weight))
            .map_err(|err| ScenarioError::InvalidWeights {
                scenario: self.name.clone(),
                reason: err.to_string(),
            })?;

        Ok(Scenario {
            name: self.name,
            tasks: self.tasks,
            seeded: self.seeded,
            distribution,
        })
    }
}

/// A named bundle of weighted tasks, optionally preceded by seeding.
#[derive(Debug)]
pub struct Scenario {
    name: String,
    tasks: Vec<Task>,
    seeded: bool,
    distribution: WeightedIndex<u32>,
}

impl Scenario {
    /// Constructs a new scenario builder with the given name.
    pub fn builder(name: impl Into<String>) -> ScenarioBuilder {
        ScenarioBuilder {
            name: name.into(),
            tasks: Vec::new(),
            seeded: false,
        }
    }

    /// Name of the scenario for identification in logs and reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All tasks in declaration order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Whether users of this scenario run seeding first.
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Sum of all task weights.
    pub fn total_weight(&self) -> u32 {
        self.tasks.iter().map(|task| task.weight).sum()
    }

    /// Samples a task with probability proportional to its weight.
    pub fn pick<R: Rng>(&self, rng: &mut R) -> &Task {
        &self.tasks[self.distribution.sample(rng)]
    }

    /// Picks the next task and prepares its request.
    pub fn next_request(&self, state: &mut UserState) -> Request {
        let task = self.pick(&mut state.rng);
        task.prepare(state)
    }

    /// Requests to run once when a user starts, before any weighted task.
    ///
    /// Empty for scenarios without seeding.
    pub fn seed_requests(&self, state: &mut UserState) -> Vec<Request> {
        if !self.seeded {
            return Vec::new();
        }

        SEED_IDS
            .map(|id| Request::post_product(SEED_NAME, Product::seed(id, &mut state.rng)))
            .collect()
    }
}

/// The predefined scenarios.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    /// Read-heavy mix of product reads and writes, with seeding.
    Mixed,
    /// Product reads only, with seeding.
    ReadOnly,
    /// Sequential product writes only.
    WriteOnly,
    /// Product searches with an occasional health check, against the search service.
    Search,
}

impl ScenarioKind {
    /// All predefined scenarios.
    pub const ALL: [ScenarioKind; 4] = [
        ScenarioKind::Mixed,
        ScenarioKind::ReadOnly,
        ScenarioKind::WriteOnly,
        ScenarioKind::Search,
    ];

    /// The configuration name of this scenario.
    pub fn as_str(self) -> &'static str {
        match self {
            ScenarioKind::Mixed => "mixed",
            ScenarioKind::ReadOnly => "read_only",
            ScenarioKind::WriteOnly => "write_only",
            ScenarioKind::Search => "search",
        }
    }

    /// Builds the scenario.
    pub fn scenario(self) -> Scenario {
        let builder = match self {
            ScenarioKind::Mixed => Scenario::builder(self.as_str())
                .seeded(true)
                .task("GET /products/:id", 3, Action::GetProduct)
                .task("POST /products/:id/details", 1, Action::PostProduct),
            ScenarioKind::ReadOnly => Scenario::builder(self.as_str())
                .seeded(true)
                .task("GET /products/:id (read-only)", 1, Action::GetProduct),
            ScenarioKind::WriteOnly => Scenario::builder(self.as_str()).task(
                "POST /products/:id/details (write-only)",
                1,
                Action::PostSequential,
            ),
            ScenarioKind::Search => Scenario::builder(self.as_str())
                .task("/products/search", 10, Action::Search)
                .task("/health", 1, Action::Health),
        };

        // predefined weights are all positive
        match builder.build() {
            Ok(scenario) => scenario,
            Err(err) => unreachable!("{err}"),
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
