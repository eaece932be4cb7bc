//! Lineage arena: the chain of transfers and stock units around one unit.
//!
//! Nodes live in a flat `Vec` and refer to each other by index. The arena is
//! assembled by walking `source_transfer_id` references one lookup at a time;
//! it never holds references into the store.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use tradeledger_core::{DomainError, DomainResult, PartyId, Quantity, StockUnitId, TransferId};

use crate::stock_unit::{StockUnit, StockUnitStatus};
use crate::transfer::{Transfer, TransferStatus};

/// Stock unit snapshot held by a lineage node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageUnit {
    pub stock_unit_id: StockUnitId,
    pub challan_no: String,
    pub party_id: PartyId,
    pub total: Quantity,
    pub available: Quantity,
    pub status: StockUnitStatus,
    pub is_received_via_transfer: bool,
}

impl From<&StockUnit> for LineageUnit {
    fn from(unit: &StockUnit) -> Self {
        Self {
            stock_unit_id: unit.id_typed(),
            challan_no: unit.challan_no().to_string(),
            party_id: unit.party_id(),
            total: unit.total(),
            available: unit.available(),
            status: unit.status(),
            is_received_via_transfer: unit.is_received_via_transfer(),
        }
    }
}

/// Transfer edge connecting a node to its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEdge {
    pub transfer_id: TransferId,
    pub transfer_no: String,
    pub status: TransferStatus,
    pub quantity: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageNode {
    pub unit: LineageUnit,
    pub parent: Option<usize>,
    /// Transfer that produced this unit from `parent`.
    pub via: Option<LineageEdge>,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    nodes: Vec<LineageNode>,
    focus: usize,
    #[serde(skip)]
    positions: HashMap<StockUnitId, usize>,
}

impl Lineage {
    /// Start an arena containing only `focus`.
    pub fn new(focus: &StockUnit) -> Self {
        let mut positions = HashMap::new();
        positions.insert(focus.id_typed(), 0);
        Self {
            nodes: vec![LineageNode {
                unit: LineageUnit::from(focus),
                parent: None,
                via: None,
                children: Vec::new(),
            }],
            focus: 0,
            positions,
        }
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn nodes(&self) -> &[LineageNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&LineageNode> {
        self.nodes.get(index)
    }

    pub fn position_of(&self, id: StockUnitId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Attach `parent` as the source of node `child` through transfer `via`.
    pub fn attach_parent(
        &mut self,
        child: usize,
        parent: &StockUnit,
        via: &Transfer,
    ) -> DomainResult<usize> {
        let child_node = self
            .nodes
            .get(child)
            .ok_or_else(|| DomainError::invariant(format!("lineage node {child} does not exist")))?;
        if child_node.parent.is_some() {
            return Err(DomainError::invariant(format!(
                "stock unit {} already has a parent in the lineage",
                child_node.unit.stock_unit_id
            )));
        }
        let child_id = child_node.unit.stock_unit_id;
        let edge = edge_for(via, parent.id_typed(), child_id)?;

        let index = self.push(parent)?;
        self.nodes[child].parent = Some(index);
        self.nodes[child].via = Some(edge);
        self.nodes[index].children.push(child);
        Ok(index)
    }

    /// Attach `child` as a unit produced from node `parent` by transfer `via`.
    pub fn attach_child(
        &mut self,
        parent: usize,
        child: &StockUnit,
        via: &Transfer,
    ) -> DomainResult<usize> {
        let parent_id = self
            .nodes
            .get(parent)
            .map(|n| n.unit.stock_unit_id)
            .ok_or_else(|| {
                DomainError::invariant(format!("lineage node {parent} does not exist"))
            })?;
        if child.source_transfer_id() != Some(via.id_typed()) {
            return Err(DomainError::invariant(format!(
                "stock unit {} was not produced by transfer {}",
                child.id_typed(),
                via.id_typed()
            )));
        }
        let edge = edge_for(via, parent_id, child.id_typed())?;

        let index = self.push(child)?;
        self.nodes[index].parent = Some(parent);
        self.nodes[index].via = Some(edge);
        self.nodes[parent].children.push(index);
        Ok(index)
    }

    /// Ancestors of the focus unit, nearest first.
    pub fn ancestors(&self) -> Vec<&LineageNode> {
        let mut out = Vec::new();
        let mut cursor = self.nodes[self.focus].parent;
        while let Some(idx) = cursor {
            let node = &self.nodes[idx];
            out.push(node);
            cursor = node.parent;
        }
        out
    }

    /// Descendants of the focus unit, breadth first.
    pub fn descendants(&self) -> Vec<&LineageNode> {
        let mut out = Vec::new();
        let mut queue: VecDeque<usize> = self.nodes[self.focus].children.iter().copied().collect();
        while let Some(idx) = queue.pop_front() {
            let node = &self.nodes[idx];
            out.push(node);
            queue.extend(node.children.iter().copied());
        }
        out
    }

    /// The originating purchase (or the focus itself when it has no parent).
    pub fn origin(&self) -> &LineageNode {
        self.ancestors()
            .last()
            .copied()
            .unwrap_or(&self.nodes[self.focus])
    }

    fn push(&mut self, unit: &StockUnit) -> DomainResult<usize> {
        let id = unit.id_typed();
        if self.positions.contains_key(&id) {
            return Err(DomainError::invariant(format!(
                "stock unit {id} visited twice while walking lineage"
            )));
        }
        let index = self.nodes.len();
        self.nodes.push(LineageNode {
            unit: LineageUnit::from(unit),
            parent: None,
            via: None,
            children: Vec::new(),
        });
        self.positions.insert(id, index);
        Ok(index)
    }
}

fn edge_for(via: &Transfer, parent: StockUnitId, child: StockUnitId) -> DomainResult<LineageEdge> {
    if via.source_stock_unit_id() != parent {
        return Err(DomainError::invariant(format!(
            "transfer {} is not sourced from stock unit {parent}",
            via.id_typed()
        )));
    }
    let recipient = via
        .recipients()
        .iter()
        .find(|r| r.created_stock_unit_id == child)
        .ok_or_else(|| {
            DomainError::invariant(format!(
                "transfer {} has no recipient unit {child}",
                via.id_typed()
            ))
        })?;
    Ok(LineageEdge {
        transfer_id: via.id_typed(),
        transfer_no: via.transfer_no().to_string(),
        status: via.status(),
        quantity: recipient.quantity(),
    })
}
