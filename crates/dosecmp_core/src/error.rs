use std::fmt;

/// Errors describing a malformed volume grid
#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// One of the three dimensions is zero
    ZeroDimension { dims: [usize; 3] },
    /// A spacing component is zero, negative or not finite
    NonPositiveSpacing { spacing: [f64; 3] },
    /// An origin component is infinite or NaN
    NonFiniteOrigin { origin: [f64; 3] },
    /// The value buffer does not hold exactly one value per voxel
    ValueCountMismatch { dims: [usize; 3], expected: usize, actual: usize },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::ZeroDimension { dims } => {
                write!(f, "grid dimensions {dims:?} contain a zero-length axis")
            }
            GridError::NonPositiveSpacing { spacing } => {
                write!(f, "grid spacing {spacing:?} must be positive and finite")
            }
            GridError::NonFiniteOrigin { origin } => {
                write!(f, "grid origin {origin:?} must be finite")
            }
            GridError::ValueCountMismatch {
                dims,
                expected,
                actual,
            } => write!(
                f,
                "grid {dims:?} needs {expected} values but {actual} were supplied"
            ),
        }
    }
}

impl std::error::Error for GridError {}

/// Errors describing an unusable dose comparison configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A tolerance that divides the gamma terms is zero, negative or not finite
    NonPositiveTolerance { name: &'static str, value: f64 },
    /// No positive normalization dose is available (explicit or derived)
    NonPositiveNormalizationDose { value: f64 },
    /// A setting that must compare against doses or gamma values is NaN
    NotANumber { name: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NonPositiveTolerance { name, value } => {
                write!(f, "{name} must be positive, got {value}")
            }
            ConfigError::NonPositiveNormalizationDose { value } => {
                write!(
                    f,
                    "normalization dose must be positive, got {value} Gy \
                     (set a reference dose or supply a non-zero reference volume)"
                )
            }
            ConfigError::NotANumber { name } => write!(f, "{name} must be a number, got NaN"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors returned by the analysis engines
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    InvalidConfig(ConfigError),
    GeometryMismatch(GridError),
    /// The analysis was cancelled through its progress handle
    Cancelled,
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::InvalidConfig(e) => write!(f, "invalid configuration: {e}"),
            AnalysisError::GeometryMismatch(e) => write!(f, "geometry mismatch: {e}"),
            AnalysisError::Cancelled => write!(f, "analysis cancelled"),
        }
    }
}

impl std::error::Error for AnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnalysisError::InvalidConfig(e) => Some(e),
            AnalysisError::GeometryMismatch(e) => Some(e),
            AnalysisError::Cancelled => None,
        }
    }
}

impl From<ConfigError> for AnalysisError {
    fn from(err: ConfigError) -> Self {
        AnalysisError::InvalidConfig(err)
    }
}

impl From<GridError> for AnalysisError {
    fn from(err: GridError) -> Self {
        AnalysisError::GeometryMismatch(err)
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
