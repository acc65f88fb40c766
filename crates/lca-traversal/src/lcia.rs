//! LCIA scoring of traversal records
//!
//! Foreground records are scored directly from their flow. Process records
//! become summaries of the process's unit score; aggregated sub-fragments
//! become summaries of their nested records. Unit scores are cached on the
//! termination that produced them. Background records are re-attributed
//! copies of the target's reference record and score through its termination.

use lca_entity::{FragmentId, ProcessRef, QuantityRef, Scenario};
use lca_fragment::{ScoreKey, TermTarget, Termination};
use lca_score::{DetailedScore, EntityKey, LciaResult, UnitScore};

use crate::engine::Traversal;
use crate::error::TraversalError;
use crate::io::{group_io, IoFlow};
use crate::record::FragmentFlow;

/// Cache context for one scenario and observed flag
fn score_context(scenario: &Scenario, observed: bool) -> String {
    if observed {
        format!("{}+observed", scenario.label())
    } else {
        scenario.label()
    }
}

impl Traversal<'_> {
    /// Score one unit of `fragment`'s reference flow in `quantity`
    #[tracing::instrument(
        level = "debug",
        skip(self, quantity, scenario),
        fields(quantity = quantity.external_ref(), scenario = %scenario)
    )]
    pub fn fragment_lcia(
        &self,
        fragment: FragmentId,
        quantity: &QuantityRef,
        scenario: &Scenario,
    ) -> Result<LciaResult, TraversalError> {
        let records = self.traverse(fragment, scenario, false)?;
        let result = self.score_records(&records, quantity, scenario, false)?;
        tracing::debug!(total = result.total(), components = result.len(), "fragment scored");
        Ok(result)
    }

    /// Flatten a result with the configured tolerance
    pub fn flatten(&self, result: &LciaResult) -> Result<LciaResult, TraversalError> {
        Ok(result.flatten_with_tolerance(self.config().flatten_tolerance)?)
    }

    /// Score records produced by an earlier traversal
    pub fn score_records(
        &self,
        records: &[FragmentFlow],
        quantity: &QuantityRef,
        scenario: &Scenario,
        observed: bool,
    ) -> Result<LciaResult, TraversalError> {
        let context = score_context(scenario, observed);
        self.score_in_context(records, quantity, &context)
    }

    /// Net boundary flows of one unit of `fragment`
    pub fn cutoff_flows(
        &self,
        fragment: FragmentId,
        scenario: &Scenario,
        observed: bool,
    ) -> Result<Vec<IoFlow>, TraversalError> {
        let records = self.traverse(fragment, scenario, observed)?;
        Ok(group_io(
            records.iter().filter(|r| r.termination().is_null()),
            self.config().zero_threshold,
        ))
    }

    fn score_in_context(
        &self,
        records: &[FragmentFlow],
        quantity: &QuantityRef,
        context: &str,
    ) -> Result<LciaResult, TraversalError> {
        let mut result = LciaResult::new(quantity.clone()).with_scenario(context);
        for record in records {
            self.score_record(record, quantity, context, &mut result)?;
        }
        Ok(result)
    }

    fn score_record(
        &self,
        record: &FragmentFlow,
        quantity: &QuantityRef,
        context: &str,
        result: &mut LciaResult,
    ) -> Result<(), TraversalError> {
        let termination = record.termination();
        if record.node_weight() == 0.0 {
            return Ok(());
        }
        let entity = EntityKey::fragment(record.fragment(), record.name());
        match termination.target() {
            TermTarget::Null | TermTarget::Subfragment { descend: true, .. } => {}
            TermTarget::Foreground => {
                let cf = self.quantities().cf(record.flow(), quantity);
                if cf != 0.0 {
                    let detail = DetailedScore::new(record.flow().clone(), record.direction(), record.magnitude(), cf);
                    result.add_detail(entity, detail)?;
                }
            }
            TermTarget::Process(process) => {
                let unit = self.process_score(termination, process, record.is_background(), quantity, context)?;
                if !unit.is_empty() {
                    result.add_summary(entity, record.node_weight(), UnitScore::Nested(Box::new(unit.as_ref().clone())))?;
                }
            }
            // background records carry the target's own termination
            TermTarget::Background(_) => {}
            TermTarget::Subfragment { descend: false, .. } => {
                if record.subfragments().is_empty() {
                    return Ok(());
                }
                // nested records follow the target tree; keyed to the store revision
                let key = ScoreKey::new(quantity, context).at_revision(self.store().revision());
                let unit = termination
                    .score_cache()
                    .get_or_try_insert_with(key, || {
                        self.score_in_context(record.subfragments(), quantity, context)
                    })?;
                if !unit.is_empty() {
                    result.add_summary(entity, record.node_weight(), UnitScore::Nested(Box::new(unit.as_ref().clone())))?;
                }
            }
        }
        Ok(())
    }

    /// Unit score of a process termination, from the cache when present
    fn process_score(
        &self,
        termination: &Termination,
        process: &ProcessRef,
        background: bool,
        quantity: &QuantityRef,
        context: &str,
    ) -> Result<std::sync::Arc<LciaResult>, TraversalError> {
        termination
            .score_cache()
            .get_or_try_insert_with(ScoreKey::new(quantity, context), || {
                let solver = self.background();
                let exchanges = if background || solver.is_in_background(process) {
                    solver.lci(process)
                } else {
                    solver.emissions(process)
                };
                let mut unit = LciaResult::new(quantity.clone());
                for exchange in exchanges {
                    let cf = self.quantities().cf(&exchange.flow, quantity);
                    if cf == 0.0 {
                        continue;
                    }
                    let entity = EntityKey::from(&exchange.flow);
                    unit.add_detail(entity, DetailedScore::new(exchange.flow, exchange.direction, exchange.value, cf))?;
                }
                tracing::trace!(process = process.external_ref(), total = unit.total(), "unit score computed");
                Ok::<_, TraversalError>(unit)
            })
    }
}
