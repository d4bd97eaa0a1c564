//! Workflow configuration and stage rules.
//!
//! Each workflow kind maps to an ordered list of stage rules. A rule flagged
//! `auto` is applied by the engine as soon as an order sits at its stage; a
//! manual rule gates on an external signal (`approve`, `picked`, `packed`) or,
//! for the shipping stage, on a carrier-reported delivery. Stages without an
//! outgoing rule (terminal and marker stages) park the order, which is what
//! makes repeated advancement a no-op.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::order::{InvalidEnumValue, OrderStatus};

/// The workflow definition an order runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    #[default]
    Standard,
    Express,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Standard => "standard",
            WorkflowKind::Express => "express",
        }
    }
}

impl std::str::FromStr for WorkflowKind {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(WorkflowKind::Standard),
            "express" => Ok(WorkflowKind::Express),
            other => Err(InvalidEnumValue {
                value: other.to_string(),
                expected: "standard, express",
            }),
        }
    }
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named step in an order's fulfillment lifecycle.
///
/// `PaymentCompleted` and `Shipped` are marker stages set by the payment
/// processor and the label issuer; they have no outgoing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    #[default]
    Created,
    Validation,
    InventoryCheck,
    CreditCheck,
    Approval,
    Confirmed,
    Processing,
    Picking,
    Packing,
    Shipping,
    Delivered,
    Completed,
    PaymentCompleted,
    Shipped,
    Cancelled,
}

impl WorkflowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStage::Created => "created",
            WorkflowStage::Validation => "validation",
            WorkflowStage::InventoryCheck => "inventory_check",
            WorkflowStage::CreditCheck => "credit_check",
            WorkflowStage::Approval => "approval",
            WorkflowStage::Confirmed => "confirmed",
            WorkflowStage::Processing => "processing",
            WorkflowStage::Picking => "picking",
            WorkflowStage::Packing => "packing",
            WorkflowStage::Shipping => "shipping",
            WorkflowStage::Delivered => "delivered",
            WorkflowStage::Completed => "completed",
            WorkflowStage::PaymentCompleted => "payment_completed",
            WorkflowStage::Shipped => "shipped",
            WorkflowStage::Cancelled => "cancelled",
        }
    }

    /// The lifecycle status implied by entering this stage, if any.
    ///
    /// Shipping and cancellation set their statuses through their own
    /// operations, not through stage advancement.
    pub fn derived_status(&self) -> Option<OrderStatus> {
        match self {
            WorkflowStage::Confirmed => Some(OrderStatus::Confirmed),
            WorkflowStage::Processing | WorkflowStage::Picking | WorkflowStage::Packing => {
                Some(OrderStatus::Processing)
            }
            WorkflowStage::Delivered => Some(OrderStatus::Delivered),
            _ => None,
        }
    }
}

impl std::str::FromStr for WorkflowStage {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(WorkflowStage::Created),
            "validation" => Ok(WorkflowStage::Validation),
            "inventory_check" => Ok(WorkflowStage::InventoryCheck),
            "credit_check" => Ok(WorkflowStage::CreditCheck),
            "approval" => Ok(WorkflowStage::Approval),
            "confirmed" => Ok(WorkflowStage::Confirmed),
            "processing" => Ok(WorkflowStage::Processing),
            "picking" => Ok(WorkflowStage::Picking),
            "packing" => Ok(WorkflowStage::Packing),
            "shipping" => Ok(WorkflowStage::Shipping),
            "delivered" => Ok(WorkflowStage::Delivered),
            "completed" => Ok(WorkflowStage::Completed),
            "payment_completed" => Ok(WorkflowStage::PaymentCompleted),
            "shipped" => Ok(WorkflowStage::Shipped),
            "cancelled" => Ok(WorkflowStage::Cancelled),
            other => Err(InvalidEnumValue {
                value: other.to_string(),
                expected: "a workflow stage name",
            }),
        }
    }
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An external signal completing a manual stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageSignal {
    Approve,
    Picked,
    Packed,
}

impl StageSignal {
    /// The stage this signal completes.
    pub fn completes(&self) -> WorkflowStage {
        match self {
            StageSignal::Approve => WorkflowStage::Approval,
            StageSignal::Picked => WorkflowStage::Picking,
            StageSignal::Packed => WorkflowStage::Packing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageSignal::Approve => "approve",
            StageSignal::Picked => "picked",
            StageSignal::Packed => "packed",
        }
    }
}

impl std::str::FromStr for StageSignal {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(StageSignal::Approve),
            "picked" => Ok(StageSignal::Picked),
            "packed" => Ok(StageSignal::Packed),
            other => Err(InvalidEnumValue {
                value: other.to_string(),
                expected: "approve, picked, packed",
            }),
        }
    }
}

impl std::fmt::Display for StageSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transition in a workflow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageRule {
    pub stage: WorkflowStage,
    pub next: WorkflowStage,
    /// True when the engine applies the transition without external input.
    pub auto: bool,
}

impl StageRule {
    const fn auto(stage: WorkflowStage, next: WorkflowStage) -> Self {
        Self {
            stage,
            next,
            auto: true,
        }
    }

    const fn manual(stage: WorkflowStage, next: WorkflowStage) -> Self {
        Self {
            stage,
            next,
            auto: false,
        }
    }
}

/// Immutable per-workflow-kind stage graphs, built once at startup.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    flows: HashMap<WorkflowKind, Vec<StageRule>>,
}

impl WorkflowConfig {
    /// Builds the default standard and express flows.
    pub fn default_flows() -> Self {
        use WorkflowStage::*;

        let standard = vec![
            StageRule::auto(Created, Validation),
            StageRule::auto(Validation, InventoryCheck),
            StageRule::auto(InventoryCheck, CreditCheck),
            StageRule::auto(CreditCheck, Approval),
            StageRule::manual(Approval, Confirmed),
            StageRule::auto(Confirmed, Processing),
            StageRule::auto(Processing, Picking),
            StageRule::manual(Picking, Packing),
            StageRule::manual(Packing, Shipping),
            StageRule::manual(Shipping, Delivered),
            StageRule::auto(Delivered, Completed),
        ];

        let express = vec![
            StageRule::auto(Created, Validation),
            StageRule::auto(Validation, Confirmed),
            StageRule::auto(Confirmed, Processing),
            StageRule::auto(Processing, Shipping),
            StageRule::manual(Shipping, Delivered),
            StageRule::auto(Delivered, Completed),
        ];

        let mut flows = HashMap::new();
        flows.insert(WorkflowKind::Standard, standard);
        flows.insert(WorkflowKind::Express, express);
        Self { flows }
    }

    /// The stage every order starts in.
    pub fn initial_stage() -> WorkflowStage {
        WorkflowStage::Created
    }

    /// Looks up the rule out of `stage` for the given workflow kind.
    pub fn rule(&self, kind: WorkflowKind, stage: WorkflowStage) -> Option<&StageRule> {
        self.flows
            .get(&kind)
            .and_then(|rules| rules.iter().find(|r| r.stage == stage))
    }

    /// The next stage if it can be entered without external input.
    pub fn next_auto(&self, kind: WorkflowKind, stage: WorkflowStage) -> Option<WorkflowStage> {
        self.rule(kind, stage)
            .filter(|r| r.auto)
            .map(|r| r.next)
    }

    /// Stages in which an order is waiting for automatic advancement.
    ///
    /// An order found in one of these stages had its post-commit advancement
    /// interrupted and should be retried.
    pub fn auto_stages(&self) -> Vec<WorkflowStage> {
        let mut stages: Vec<WorkflowStage> = self
            .flows
            .values()
            .flatten()
            .filter(|r| r.auto)
            .map(|r| r.stage)
            .collect();
        stages.sort_by_key(|s| s.as_str());
        stages.dedup();
        stages
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::default_flows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk_auto(config: &WorkflowConfig, kind: WorkflowKind) -> WorkflowStage {
        let mut stage = WorkflowConfig::initial_stage();
        while let Some(next) = config.next_auto(kind, stage) {
            stage = next;
        }
        stage
    }

    #[test]
    fn standard_flow_parks_at_approval() {
        let config = WorkflowConfig::default_flows();
        assert_eq!(
            walk_auto(&config, WorkflowKind::Standard),
            WorkflowStage::Approval
        );
    }

    #[test]
    fn express_flow_parks_at_shipping() {
        let config = WorkflowConfig::default_flows();
        assert_eq!(
            walk_auto(&config, WorkflowKind::Express),
            WorkflowStage::Shipping
        );
    }

    #[test]
    fn express_flow_skips_warehouse_stages() {
        let config = WorkflowConfig::default_flows();
        for stage in [
            WorkflowStage::InventoryCheck,
            WorkflowStage::CreditCheck,
            WorkflowStage::Approval,
            WorkflowStage::Picking,
            WorkflowStage::Packing,
        ] {
            assert!(config.rule(WorkflowKind::Express, stage).is_none());
        }
    }

    #[test]
    fn marker_stages_have_no_rule() {
        let config = WorkflowConfig::default_flows();
        for kind in [WorkflowKind::Standard, WorkflowKind::Express] {
            assert!(config.rule(kind, WorkflowStage::PaymentCompleted).is_none());
            assert!(config.rule(kind, WorkflowStage::Shipped).is_none());
            assert!(config.rule(kind, WorkflowStage::Completed).is_none());
        }
    }

    #[test]
    fn delivered_auto_advances_to_completed() {
        let config = WorkflowConfig::default_flows();
        for kind in [WorkflowKind::Standard, WorkflowKind::Express] {
            assert_eq!(
                config.next_auto(kind, WorkflowStage::Delivered),
                Some(WorkflowStage::Completed)
            );
        }
    }

    #[test]
    fn manual_stages_do_not_auto_advance() {
        let config = WorkflowConfig::default_flows();
        for stage in [
            WorkflowStage::Approval,
            WorkflowStage::Picking,
            WorkflowStage::Packing,
            WorkflowStage::Shipping,
        ] {
            assert_eq!(config.next_auto(WorkflowKind::Standard, stage), None);
        }
    }

    #[test]
    fn signals_complete_their_stages() {
        assert_eq!(StageSignal::Approve.completes(), WorkflowStage::Approval);
        assert_eq!(StageSignal::Picked.completes(), WorkflowStage::Picking);
        assert_eq!(StageSignal::Packed.completes(), WorkflowStage::Packing);
    }

    #[test]
    fn derived_statuses() {
        assert_eq!(
            WorkflowStage::Confirmed.derived_status(),
            Some(OrderStatus::Confirmed)
        );
        assert_eq!(
            WorkflowStage::Picking.derived_status(),
            Some(OrderStatus::Processing)
        );
        assert_eq!(
            WorkflowStage::Delivered.derived_status(),
            Some(OrderStatus::Delivered)
        );
        assert_eq!(WorkflowStage::Validation.derived_status(), None);
        assert_eq!(WorkflowStage::PaymentCompleted.derived_status(), None);
        // the coarse status stays "delivered" when the workflow itself completes
        assert_eq!(WorkflowStage::Completed.derived_status(), None);
    }

    #[test]
    fn stage_round_trip() {
        for stage in [
            WorkflowStage::Created,
            WorkflowStage::InventoryCheck,
            WorkflowStage::PaymentCompleted,
            WorkflowStage::Completed,
        ] {
            let parsed: WorkflowStage = stage.as_str().parse().unwrap();
            assert_eq!(parsed, stage);
        }
        assert!("unknown_stage".parse::<WorkflowStage>().is_err());
    }

    #[test]
    fn auto_stages_cover_both_flows() {
        let config = WorkflowConfig::default_flows();
        let stages = config.auto_stages();
        assert!(stages.contains(&WorkflowStage::Created));
        assert!(stages.contains(&WorkflowStage::Delivered));
        assert!(!stages.contains(&WorkflowStage::Approval));
    }
}
