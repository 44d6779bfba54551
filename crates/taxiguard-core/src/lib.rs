pub mod alert;
pub mod compliance;
pub mod conflict;
pub mod errors;
pub mod models;
pub mod rules;
pub mod spatial;
pub mod surface;
pub mod trajectory;

pub use alert::{Alert, AlertEmitter, AlertRecord};
pub use compliance::{ComplianceEvent, ComplianceMonitor, ViolationKind};
pub use conflict::{ConflictDetector, ConflictEvent};
pub use errors::{SurfaceError, TrackError};
pub use models::{AircraftState, Clearance, ClearanceKind, Fix, PositionReport};
pub use rules::{SafetyRules, Severity, SeverityTiers};
pub use surface::{FeatureGeometry, FeatureKind, SurfaceFeature, SurfaceMap};
pub use trajectory::{PredictedTrajectory, TrajectoryEstimator, TrajectoryPoint};
