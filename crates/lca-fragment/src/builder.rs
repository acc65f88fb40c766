//! Fragment trees built from process inventories

use lca_entity::{BackgroundSolver, Direction, Flow, FragmentId, ProcessRef, TerminationKey};

use crate::error::FragmentError;
use crate::fragment::FragmentSpec;
use crate::store::FragmentStore;
use crate::termination::TerminationSpec;

/// Build a reference fragment for `reference` terminated to `process`, with
/// one child per exchange.
///
/// Foreground processes contribute every exchange of
/// [`BackgroundSolver::foreground`]; the reference exchange sets the
/// termination's inbound value and is not repeated as a child. Background
/// processes contribute their dependencies (process-terminated children) and
/// emissions (cutoff children), and their reference is taken as one unit.
#[tracing::instrument(level = "debug", skip(store, solver, reference), fields(process = process.external_ref()))]
pub fn fragment_from_process(
    store: &mut FragmentStore,
    solver: &dyn BackgroundSolver,
    process: &ProcessRef,
    reference: &Flow,
    direction: Direction,
) -> Result<FragmentId, FragmentError> {
    let in_background = solver.is_in_background(process);
    let exchanges = if in_background {
        let mut all = solver.dependencies(process);
        all.extend(solver.emissions(process));
        all
    } else {
        solver.foreground(process)
    };

    let mut inbound_ev = 1.0;
    let mut found_reference = in_background;
    let mut children = Vec::with_capacity(exchanges.len());
    for exchange in exchanges {
        if !found_reference && exchange.flow == *reference && exchange.direction == direction {
            inbound_ev = exchange.value;
            found_reference = true;
        } else {
            children.push(exchange);
        }
    }
    if !found_reference {
        return Err(FragmentError::MissingReferenceExchange {
            process: process.external_ref().to_string(),
            flow: reference.external_ref().to_string(),
        });
    }

    let top = store.create(FragmentSpec::new(reference.clone(), direction).named(process.name()))?;
    store.terminate(
        top,
        TerminationKey::Default,
        TerminationSpec::process(process.clone())
            .with_direction(direction)
            .with_inbound_ev(inbound_ev),
    )?;

    for exchange in children {
        let child = store.create(
            FragmentSpec::new(exchange.flow.clone(), exchange.direction)
                .child_of(top)
                .with_value(exchange.value),
        )?;
        if let Some(supplier) = exchange.termination {
            store.terminate(child, TerminationKey::Default, TerminationSpec::process(supplier))?;
        }
    }
    tracing::debug!(fragment = %top, children = store.children(top).count(), "fragment built from process");
    Ok(top)
}
