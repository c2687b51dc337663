//! Flow tracing between account groups
//!
//! Answers "how did value move from accounts 572* to accounts 400*":
//! entries posting to both groups at once are direct relations; entries on
//! the destination side that merely share a partner with source-side
//! activity are indirect ones. The source-side scan is capped, so the
//! trace is an evidence sample rather than an exhaustive audit.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::ErpClient;
use crate::domain::{CompareOp, Domain};
use crate::error::{GatewayError, Result};
use crate::queries::{date_bounds, decode_rows, dedup_first_seen, resolve_account_ids};
use crate::records::{EntryHeader, EntryLine, ENTRY_LINE_MODEL, ENTRY_MODEL};

/// Default ceiling on journal items scanned per side.
pub const DEFAULT_LINE_SCAN_CAP: i64 = 100;

pub const DEFAULT_FLOW_LIMIT: usize = 10;

fn default_line_scan_cap() -> i64 {
    DEFAULT_LINE_SCAN_CAP
}

fn default_flow_limit() -> usize {
    DEFAULT_FLOW_LIMIT
}

const SCAN_FIELDS: &[&str] = &["move_id", "partner_id", "date"];
const RELATION_LINE_FIELDS: &[&str] = &["name", "account_id", "debit", "credit", "balance"];
const RELATION_HEADER_FIELDS: &[&str] = &["name", "date", "ref", "journal_id", "state", "partner_id"];

#[derive(Debug, Clone, Deserialize)]
pub struct FlowParams {
    /// Source account code prefix, e.g. "572" for banks.
    pub from_account: String,
    /// Destination account code prefix, e.g. "400" for suppliers.
    pub to_account: String,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Ceiling on reported relations. Direct findings take precedence;
    /// indirect ones only fill the remainder.
    #[serde(default = "default_flow_limit")]
    pub limit: usize,
    /// Ceiling on journal items scanned per side.
    #[serde(default = "default_line_scan_cap")]
    pub line_scan_cap: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Direct,
    Indirect,
}

/// An entry posting to both account groups, with its full line set.
#[derive(Debug, Clone, Serialize)]
pub struct DirectRelation {
    #[serde(rename = "type")]
    pub kind: RelationKind,
    pub entry: EntryHeader,
    pub lines: Vec<EntryLine>,
}

/// A destination-side entry tied to the source side only through a shared
/// partner.
#[derive(Debug, Clone, Serialize)]
pub struct IndirectRelation {
    #[serde(rename = "type")]
    pub kind: RelationKind,
    pub entry: EntryHeader,
    pub lines: Vec<EntryLine>,
    /// Source-side entries involving the same partner.
    pub related_source_entries: Vec<i64>,
    pub partner: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    pub from_account: String,
    pub to_account: String,
    pub direct_relations: Vec<DirectRelation>,
    pub indirect_relations: Vec<IndirectRelation>,
    pub total_direct_relations: usize,
    pub total_indirect_relations: usize,
}

pub struct FlowTracer {
    client: Arc<ErpClient>,
}

impl FlowTracer {
    pub fn new(client: Arc<ErpClient>) -> Self {
        Self { client }
    }

    /// Trace value movement between two account code prefixes.
    pub async fn run(&self, params: &FlowParams) -> Result<FlowReport> {
        let from_ids = resolve_account_ids(&self.client, &params.from_account).await?;
        let to_ids = resolve_account_ids(&self.client, &params.to_account).await?;
        info!(
            from = %params.from_account,
            to = %params.to_account,
            "tracing account flow"
        );

        // Source-side journal items define the candidate universe.
        let from_domain = date_bounds(
            Domain::new().filter("account_id", CompareOp::In, from_ids),
            "date",
            params.date_from,
            params.date_to,
        );
        let from_lines: Vec<EntryLine> = decode_rows(
            self.client
                .search_read(
                    ENTRY_LINE_MODEL,
                    &from_domain,
                    SCAN_FIELDS,
                    Some(params.line_scan_cap),
                    None,
                    None,
                )
                .await?,
        )?;

        let from_move_ids =
            dedup_first_seen(from_lines.iter().filter_map(|l| l.entry.as_ref().map(|r| r.id)));
        let partner_ids =
            dedup_first_seen(from_lines.iter().filter_map(|l| l.partner.as_ref().map(|r| r.id)));
        debug!(
            entries = from_move_ids.len(),
            partners = partner_ids.len(),
            "source side scanned"
        );

        let direct_relations = self.direct_relations(&from_move_ids, &to_ids).await?;

        let indirect_relations = if direct_relations.len() < params.limit && !partner_ids.is_empty()
        {
            let budget = params.limit - direct_relations.len();
            self.indirect_relations(params, &from_lines, &from_move_ids, &partner_ids, &to_ids, budget)
                .await?
        } else {
            Vec::new()
        };

        info!(
            direct = direct_relations.len(),
            indirect = indirect_relations.len(),
            "flow trace complete"
        );
        Ok(FlowReport {
            from_account: params.from_account.clone(),
            to_account: params.to_account.clone(),
            total_direct_relations: direct_relations.len(),
            total_indirect_relations: indirect_relations.len(),
            direct_relations,
            indirect_relations,
        })
    }

    async fn direct_relations(
        &self,
        from_move_ids: &[i64],
        to_ids: &[i64],
    ) -> Result<Vec<DirectRelation>> {
        let mut relations = Vec::new();
        for &move_id in from_move_ids {
            let probe = Domain::new()
                .filter("move_id", CompareOp::Eq, move_id)
                .filter("account_id", CompareOp::In, to_ids.to_vec());
            let hits = self
                .client
                .search_read(ENTRY_LINE_MODEL, &probe, RELATION_LINE_FIELDS, None, None, None)
                .await?;
            if hits.is_empty() {
                continue;
            }

            debug!(move_id, "entry posts to both account groups");
            let (entry, lines) = self.load_entry(move_id).await?;
            relations.push(DirectRelation {
                kind: RelationKind::Direct,
                entry,
                lines,
            });
        }
        Ok(relations)
    }

    async fn indirect_relations(
        &self,
        params: &FlowParams,
        from_lines: &[EntryLine],
        from_move_ids: &[i64],
        partner_ids: &[i64],
        to_ids: &[i64],
        budget: usize,
    ) -> Result<Vec<IndirectRelation>> {
        let to_domain = date_bounds(
            Domain::new()
                .filter("account_id", CompareOp::In, to_ids.to_vec())
                .filter("partner_id", CompareOp::In, partner_ids.to_vec()),
            "date",
            params.date_from,
            params.date_to,
        );
        let to_lines: Vec<EntryLine> = decode_rows(
            self.client
                .search_read(
                    ENTRY_LINE_MODEL,
                    &to_domain,
                    SCAN_FIELDS,
                    Some(params.line_scan_cap),
                    None,
                    None,
                )
                .await?,
        )?;

        // Entries already reported as direct stay out; the remainder is cut
        // to the budget before verification, so the trace never loads more
        // entries than it can report.
        let candidates: Vec<i64> =
            dedup_first_seen(to_lines.iter().filter_map(|l| l.entry.as_ref().map(|r| r.id)))
                .into_iter()
                .filter(|id| !from_move_ids.contains(id))
                .take(budget)
                .collect();

        let mut relations = Vec::new();
        for move_id in candidates {
            let (entry, lines) = self.load_entry(move_id).await?;

            let touches_destination = lines
                .iter()
                .any(|l| l.account.as_ref().map_or(false, |a| to_ids.contains(&a.id)));
            if !touches_destination {
                continue;
            }

            let Some(partner) = entry.partner.clone() else {
                continue;
            };
            let related_source_entries = dedup_first_seen(
                from_lines
                    .iter()
                    .filter(|l| l.partner.as_ref().map_or(false, |p| p.id == partner.id))
                    .filter_map(|l| l.entry.as_ref().map(|r| r.id)),
            );
            if related_source_entries.is_empty() {
                continue;
            }

            relations.push(IndirectRelation {
                kind: RelationKind::Indirect,
                entry,
                lines,
                related_source_entries,
                partner: partner.name,
            });
        }
        Ok(relations)
    }

    /// Entry header plus all of its lines.
    async fn load_entry(&self, move_id: i64) -> Result<(EntryHeader, Vec<EntryLine>)> {
        let mut rows = self
            .client
            .read(ENTRY_MODEL, &[move_id], RELATION_HEADER_FIELDS)
            .await?;
        if rows.is_empty() {
            return Err(GatewayError::NotFound(format!("entry {move_id} not found")));
        }
        let entry: EntryHeader = serde_json::from_value(rows.remove(0))?;

        let lines: Vec<EntryLine> = decode_rows(
            self.client
                .search_read(
                    ENTRY_LINE_MODEL,
                    &Domain::new().filter("move_id", CompareOp::Eq, move_id),
                    RELATION_LINE_FIELDS,
                    None,
                    None,
                    None,
                )
                .await?,
        )?;
        Ok((entry, lines))
    }
}
