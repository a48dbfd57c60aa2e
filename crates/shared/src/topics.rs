//! Centralized bus subject constants for NATS
//!
//! This module provides a single source of truth for all subject names
//! spoken by the lifecycle manager, preventing mismatches between
//! publishers and consumers.
//!
//! ## Naming Convention
//! - Platform subjects: `haizea.fpga.{action}`
//! - Infrastructure-backend subjects: `infrastructure.fpga.{action}`

/// Subject prefix for all Haizea FPGA platform messages
pub const FPGA_PREFIX: &str = "haizea.fpga";

/// Subjects owned by the lifecycle manager
pub mod lifecycle_topics {

    /// Inbound instantiation requests; also the default origin topic
    /// for outcome notifications
    pub const DEPLOY: &str = "haizea.fpga.deploy";
    /// Inbound termination requests
    pub const TERMINATE: &str = "haizea.fpga.terminate";
    /// Shared reply subject for every correlated call this plugin issues
    pub const RESPONSES: &str = "haizea.fpga.lifecycle.responses";

    /// Wildcard for all lifecycle subjects
    pub const ALL: &str = "haizea.fpga.>";
}

/// Subjects of the infrastructure-provisioning backend
pub mod infrastructure_topics {

    /// Outbound provisioning requests
    pub const DEPLOY: &str = "infrastructure.fpga.deploy";
    /// Outbound teardown requests
    pub const TERMINATE: &str = "infrastructure.fpga.terminate";

    /// Wildcard for all infrastructure subjects
    pub const ALL: &str = "infrastructure.fpga.>";
}

/// Plugin-manager subjects (announce/deregister handshake)
pub mod management_topics {

    /// Plugin announcement on startup
    pub const REGISTER: &str = "haizea.management.plugin.register";
    /// Plugin deregistration on shutdown
    pub const DEREGISTER: &str = "haizea.management.plugin.deregister";
}

/// Helper function to build a subject from entity and action
#[inline]
pub fn subject(prefix: &str, action: &str) -> String {
    format!("{}.{}", prefix, action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects_share_the_platform_prefix() {
        assert!(lifecycle_topics::DEPLOY.starts_with(FPGA_PREFIX));
        assert!(lifecycle_topics::TERMINATE.starts_with(FPGA_PREFIX));
        assert!(lifecycle_topics::RESPONSES.starts_with(FPGA_PREFIX));
    }

    #[test]
    fn test_wildcards() {
        assert!(lifecycle_topics::ALL.ends_with(".>"));
        assert!(infrastructure_topics::ALL.ends_with(".>"));
    }

    #[test]
    fn test_subject_helper() {
        assert_eq!(subject(FPGA_PREFIX, "deploy"), "haizea.fpga.deploy");
        assert_eq!(
            subject("infrastructure.fpga", "terminate"),
            "infrastructure.fpga.terminate"
        );
    }
}
