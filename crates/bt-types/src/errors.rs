use thiserror::Error;

/// Main error type for the Betatron controller
#[derive(Error, Debug)]
pub enum BtError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Commit error: {0}")]
    Commit(#[from] CommitError),

    #[error("Track error: {0}")]
    Track(#[from] TrackError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Invalid controller or track configuration, raised at construction time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("At least one parameter track is required")]
    NoTracks,

    #[error("Parameter name must not be empty")]
    EmptyName,

    #[error("Duplicate parameter name: {name}")]
    DuplicateName { name: String },

    #[error("Invalid bounds for {name}: lower {lower} is above upper {upper}")]
    InvertedBounds { name: String, lower: f64, upper: f64 },

    #[error("Bound for {name} is NaN")]
    NanBound { name: String },

    #[error("No integer command fits inside the bounds of {name} ({lower}..={upper})")]
    NoIntegerInBounds { name: String, lower: f64, upper: f64 },

    #[error("Learning rate for {name} must be positive and finite, got {value}")]
    LearningRate { name: String, value: f64 },

    #[error("Momentum must lie in [0, 1), got {value}")]
    Momentum { value: f64 },

    #[error("Convergence tolerance must be positive and finite, got {value}")]
    Tolerance { value: f64 },

    #[error("Iteration limit must be positive")]
    IterationLimit,

    #[error("Initial value {value} of {name} lies outside its bounds")]
    InitialOutOfBounds { name: String, value: i64 },

    #[error("Bootstrap probe {value} of {name} lies outside its bounds")]
    ProbeOutOfBounds { name: String, value: i64 },
}

/// Failure while sampling the objective. No controller state is mutated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Evaluator failed: {message}")]
    Failed { message: String },

    #[error("Objective is not finite: {value}")]
    NonFiniteObjective { value: f64 },

    #[error("Missing derivative for parameter {name}")]
    MissingDerivative { name: String },

    #[error("Derivative for {name} is not finite: {value}")]
    NonFiniteDerivative { name: String, value: f64 },

    #[error("Unknown parameter in evaluation point: {name}")]
    UnknownParameter { name: String },
}

/// Failure while handing a command vector to the actuators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommitError {
    #[error("No actuator route for parameter {name}")]
    NoRoute { name: String },

    #[error("Command vector has no value for {name}")]
    MissingValue { name: String },

    #[error("Malformed command file {path}: {message}")]
    Malformed { path: String, message: String },

    #[error("Failed to write {path}: {message}")]
    Write { path: String, message: String },

    #[error("Actuator rejected command: {message}")]
    Rejected { message: String },
}

/// Precondition violations on a single parameter track.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackError {
    #[error("Track {name} was already bootstrapped")]
    AlreadyBootstrapped { name: String },

    #[error("Track {name} needs exactly one committed value to probe, has {len}")]
    ProbeLength { name: String, len: usize },

    #[error("Track {name} needs two committed values for a momentum update, has {len}")]
    NotBootstrapped { name: String, len: usize },

    #[error("Track {name} has no derivative sample")]
    NoDerivative { name: String },
}

/// Result type alias for Betatron operations
pub type BtResult<T> = Result<T, BtError>;
