//! Interface detection using entrypoints
//!
//! Token standards are recognized by the entrypoints a contract exposes.
//! Each standard has a required entrypoint set; a contract may satisfy more
//! than one (an FA1.2 token also satisfies FA1).

/// Token standard identified by interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    /// FA1 ledger (TZIP-5)
    Fa1,
    /// FA1.2 approvable ledger (TZIP-7)
    Fa12,
    /// FA2 multi-asset (TZIP-12)
    Fa2,
}

impl Interface {
    /// Tag stored on contracts implementing this interface
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Fa1 => "fa1",
            Self::Fa12 => "fa1-2",
            Self::Fa2 => "fa2",
        }
    }
}

/// Interface definition
struct InterfaceSpec {
    interface: Interface,
    /// Entrypoints that MUST be present
    required: &'static [&'static str],
}

impl InterfaceSpec {
    fn matches(&self, entrypoints: &[String]) -> bool {
        self.required
            .iter()
            .all(|name| entrypoints.iter().any(|e| e == name))
    }
}

static INTERFACES: &[InterfaceSpec] = &[
    InterfaceSpec {
        interface: Interface::Fa1,
        required: &["transfer", "getBalance", "getTotalSupply"],
    },
    InterfaceSpec {
        interface: Interface::Fa12,
        required: &[
            "transfer",
            "approve",
            "getAllowance",
            "getBalance",
            "getTotalSupply",
        ],
    },
    InterfaceSpec {
        interface: Interface::Fa2,
        required: &["transfer", "balance_of", "update_operators"],
    },
];

/// All interfaces satisfied by `entrypoints`
pub fn identify_interfaces(entrypoints: &[String]) -> Vec<Interface> {
    INTERFACES
        .iter()
        .filter(|spec| spec.matches(entrypoints))
        .map(|spec| spec.interface)
        .collect()
}
