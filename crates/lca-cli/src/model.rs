//! Model files
//!
//! A model file is one JSON document with the entities a fragment model
//! refers to, their inventories and factors, and the fragment records.

use std::path::Path;

use anyhow::{bail, Context, Result};
use lca_entity::{
    Catalog, Direction, EntityResolver, Flow, FragmentId, InMemoryBackground, InMemoryQuantities, ProcessRef,
    QuantityRef,
};
use lca_fragment::{FragmentRecord, FragmentStore};
use lca_traversal::TraversalConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ModelFile {
    #[serde(default)]
    pub(crate) quantities: Vec<QuantityRef>,
    #[serde(default)]
    pub(crate) flows: Vec<FlowDef>,
    #[serde(default)]
    pub(crate) processes: Vec<ProcessDef>,
    #[serde(default)]
    pub(crate) factors: Vec<FactorDef>,
    #[serde(default)]
    pub(crate) conversions: Vec<FactorDef>,
    #[serde(default)]
    pub(crate) fragments: Vec<FragmentRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FlowDef {
    pub(crate) external_ref: String,
    #[serde(default)]
    pub(crate) name: Option<String>,
    pub(crate) quantity: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProcessDef {
    pub(crate) external_ref: String,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) background: bool,
    #[serde(default)]
    pub(crate) emissions: Vec<ExchangeDef>,
    #[serde(default)]
    pub(crate) lci: Vec<ExchangeDef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExchangeDef {
    pub(crate) flow: String,
    pub(crate) direction: Direction,
    pub(crate) value: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FactorDef {
    pub(crate) flow: String,
    pub(crate) quantity: String,
    pub(crate) value: f64,
}

/// Settings file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Settings {
    pub(crate) traversal: TraversalConfig,
}

impl Settings {
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}

/// Loaded model with its in-memory collaborators
#[derive(Debug)]
pub(crate) struct Model {
    pub(crate) catalog: Catalog,
    pub(crate) quantities: InMemoryQuantities,
    pub(crate) background: InMemoryBackground,
    pub(crate) store: FragmentStore,
}

impl Model {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading model {}", path.display()))?;
        let file: ModelFile =
            serde_json::from_str(&text).with_context(|| format!("parsing model {}", path.display()))?;
        Self::build(file).with_context(|| format!("loading model {}", path.display()))
    }

    pub(crate) fn build(file: ModelFile) -> Result<Self> {
        let mut catalog = Catalog::new();
        for quantity in file.quantities {
            catalog.add_quantity(quantity);
        }
        for def in file.flows {
            let Some(quantity) = catalog.quantity(&def.quantity) else {
                bail!("flow {} names unknown quantity {}", def.external_ref, def.quantity);
            };
            let name = def.name.unwrap_or_else(|| def.external_ref.clone());
            catalog.add_flow(Flow::new(def.external_ref, name, quantity));
        }

        let mut quantities = InMemoryQuantities::new();
        for (factor, conversion) in file
            .factors
            .iter()
            .map(|f| (f, false))
            .chain(file.conversions.iter().map(|f| (f, true)))
        {
            let flow = lookup_flow(&catalog, &factor.flow)?;
            let Some(quantity) = catalog.quantity(&factor.quantity) else {
                bail!("factor for {} names unknown quantity {}", factor.flow, factor.quantity);
            };
            if conversion {
                quantities.set_conversion(&flow, &quantity, factor.value);
            } else {
                quantities.set_factor(&flow, &quantity, factor.value);
            }
        }

        let mut background = InMemoryBackground::new();
        for def in file.processes {
            let name = def.name.unwrap_or_else(|| def.external_ref.clone());
            let process = ProcessRef::new(def.external_ref, name);
            if def.background {
                background.mark_background(&process);
            }
            for exchange in &def.emissions {
                let flow = lookup_flow(&catalog, &exchange.flow)?;
                background = background.with_emission(&process, &flow, exchange.direction, exchange.value);
            }
            for exchange in &def.lci {
                let flow = lookup_flow(&catalog, &exchange.flow)?;
                background = background.with_lci(&process, &flow, exchange.direction, exchange.value);
            }
            catalog.add_process(process);
        }

        for record in &file.fragments {
            if !record.name.is_empty() {
                catalog.add_fragment_alias(record.name.clone(), record.id);
            }
        }
        let store = FragmentStore::from_records(file.fragments, &catalog)?;
        tracing::info!(
            fragments = store.len(),
            factors = quantities.factor_count(),
            "model loaded"
        );
        Ok(Self {
            catalog,
            quantities,
            background,
            store,
        })
    }

    /// Fragment by id or by name
    pub(crate) fn fragment(&self, key: &str) -> Result<FragmentId> {
        if let Ok(id) = key.parse::<FragmentId>() {
            if self.store.contains(id) {
                return Ok(id);
            }
        }
        match self.store.find_by_name(key) {
            Some(fragment) => Ok(fragment.id()),
            None => bail!("no fragment with id or name {key}"),
        }
    }

    pub(crate) fn quantity(&self, key: &str) -> Result<QuantityRef> {
        self.catalog
            .quantity(key)
            .with_context(|| format!("unknown quantity {key}"))
    }
}

fn lookup_flow(catalog: &Catalog, external_ref: &str) -> Result<Flow> {
    catalog
        .flow(external_ref)
        .with_context(|| format!("unknown flow {external_ref}"))
}
