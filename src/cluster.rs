//! Project clustering
//!
//! Each new contract is compared against a bucket of already clustered
//! contracts, newest first. The first match donates its project; with no
//! match the contract founds a new project. Assignments are persisted before
//! the next contract is looked at, so the outcome depends on processing
//! order and clustering within one network must stay sequential.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::analyze::ContractMeta;
use crate::compare::{CompareError, Comparator};

/// Namespace of project ids derived from founding contracts
const PROJECT_NAMESPACE: Uuid = Uuid::from_u128(0x6f3c_2a1e_94b7_5d08_a1c4_7e52_0b9f_d361);

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error(transparent)]
    Compare(#[from] CompareError),

    #[error("project store: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Identifier of a group of structurally similar contracts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
    /// Id of the project founded by `contract`.
    pub fn founded_by(contract: &ContractMeta) -> Self {
        let name = format!("{}/{}", contract.network, contract.address);
        Self(Uuid::new_v5(&PROJECT_NAMESPACE, name.as_bytes()))
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Pick the project of `contract` given the bucket of clustered contracts,
/// oldest first. Unassigned candidates are ignored.
pub fn assign_project(
    comparator: &Comparator,
    contract: &ContractMeta,
    bucket: &[ContractMeta],
) -> Result<ProjectId, CompareError> {
    for candidate in bucket.iter().rev() {
        let Some(project) = candidate.project_id else {
            continue;
        };
        if comparator.compare(contract, candidate)? {
            debug!(
                address = %contract.address,
                matched = %candidate.address,
                project = %project,
                "project_matched"
            );
            return Ok(project);
        }
    }

    let project = ProjectId::founded_by(contract);
    debug!(address = %contract.address, project = %project, "project_founded");
    Ok(project)
}

/// Durable record of clustered contracts
pub trait ProjectStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Candidates for a new contract on `network`, oldest first.
    fn bucket(&self, network: &str) -> Result<Vec<ContractMeta>, Self::Error>;

    /// Record an assigned contract.
    fn save(&mut self, contract: ContractMeta) -> Result<(), Self::Error>;
}

/// In-memory store keeping contracts in discovery order per network
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    networks: HashMap<String, Vec<ContractMeta>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every saved contract of `network`, in discovery order.
    pub fn contracts(&self, network: &str) -> &[ContractMeta] {
        self.networks.get(network).map(Vec::as_slice).unwrap_or_default()
    }
}

impl ProjectStore for MemoryStore {
    type Error = Infallible;

    /// The most recent contract of each project, in discovery order.
    fn bucket(&self, network: &str) -> Result<Vec<ContractMeta>, Self::Error> {
        let contracts = self.contracts(network);
        let mut latest: HashMap<ProjectId, usize> = HashMap::new();
        for (index, contract) in contracts.iter().enumerate() {
            if let Some(project) = contract.project_id {
                latest.insert(project, index);
            }
        }
        let mut indices: Vec<usize> = latest.into_values().collect();
        indices.sort_unstable();
        Ok(indices.into_iter().map(|i| contracts[i].clone()).collect())
    }

    fn save(&mut self, contract: ContractMeta) -> Result<(), Self::Error> {
        self.networks
            .entry(contract.network.clone())
            .or_default()
            .push(contract);
        Ok(())
    }
}

/// Result of a clustering pass
#[derive(Debug, Default)]
pub struct ClusterReport {
    /// Contracts assigned during the pass, in processing order
    pub assigned: Vec<ContractMeta>,
    /// Contracts left unassigned, to retry on a later pass
    pub pending: Vec<ContractMeta>,
}

/// Sequential clustering driver over a store
pub struct Clusterer<S> {
    comparator: Comparator,
    store: S,
}

impl<S: ProjectStore> Clusterer<S> {
    pub fn new(comparator: Comparator, store: S) -> Self {
        Self { comparator, store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Assign and persist one contract. A contract that already has a
    /// project keeps it and is not saved again.
    pub fn process(&mut self, contract: &mut ContractMeta) -> Result<ProjectId, ClusterError> {
        if let Some(project) = contract.project_id {
            return Ok(project);
        }

        let bucket = self
            .store
            .bucket(&contract.network)
            .map_err(|e| ClusterError::Store(Box::new(e)))?;
        let project = assign_project(&self.comparator, contract, &bucket)?;

        let mut assigned = contract.clone();
        assigned.project_id = Some(project);
        self.store
            .save(assigned)
            .map_err(|e| ClusterError::Store(Box::new(e)))?;

        contract.project_id = Some(project);
        debug!(
            address = %contract.address,
            network = %contract.network,
            project = %project,
            "project_assigned"
        );
        Ok(project)
    }

    /// Process contracts in order. Failures leave the contract unassigned in
    /// `pending` and do not stop the pass.
    pub fn process_all(
        &mut self,
        contracts: impl IntoIterator<Item = ContractMeta>,
    ) -> ClusterReport {
        let mut report = ClusterReport::default();
        for mut contract in contracts {
            match self.process(&mut contract) {
                Ok(_) => report.assigned.push(contract),
                Err(err) => {
                    warn!(
                        address = %contract.address,
                        network = %contract.network,
                        error = %err,
                        "project_assignment_failed"
                    );
                    report.pending.push(contract);
                }
            }
        }
        report
    }
}
