pub mod address;
pub mod analyze;
pub mod cluster;
pub mod compare;
pub mod fingerprint;
pub mod forge;
pub mod interface;
pub mod macros;
pub mod metrics;
pub mod micheline;
pub mod primitives;
pub mod unforge;
pub mod zarith;

pub use address::{base58check, decode_address, decode_key_hash, AddressError};
pub use analyze::{analyze_script, ContractMeta};
pub use cluster::{
    assign_project, ClusterError, ClusterReport, Clusterer, MemoryStore, ProjectId, ProjectStore,
};
pub use compare::{Calibration, CompareError, Comparator, ComparatorConfig, Score};
pub use fingerprint::{fingerprint, Fingerprint, FingerprintError, ScriptSections, Section};
pub use forge::{encode, hash_key, pack, ForgeError};
pub use interface::{identify_interfaces, Interface};
pub use metrics::{bounded_distance, Metric, MetricKind, MetricTable};
pub use micheline::{Micheline, Prim};
pub use unforge::{decode, decode_bytes, unpack, DecodeError};
