//! Contact graph routing: graph snapshots, route search and SABR.

pub mod dijkstra;
pub mod generator;
pub mod graph;
pub mod node;
pub mod route;
pub mod sabr;
pub mod yen;

pub use dijkstra::{DijkstraResult, EAT_EPSILON, PathInfo, tvdijkstra};
pub use generator::{EliminationRouteGenerator, LimitingCriterion, RouteGenerator, RouteGeneratorKind};
pub use graph::{ContactGraph, SabrGraphData, StartTimeBasedDict};
pub use node::{Cvu, SabrConfig, SabrPolicy, VolumeLedger};
pub use route::{Route, contact_hash};
pub use sabr::{
    CandidateRoutes, PBAT_EPSILON, ProbabilityMode, RoutingRequest, SabrAlgorithm, VolumeView,
    candidate_routes, compare_candidates, probsabr, sabr,
};
pub use yen::YenRouteGenerator;
