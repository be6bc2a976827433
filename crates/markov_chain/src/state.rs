use std::fmt;

use core_types::{CoreError, CoreResult, CreativeAttributes, ProductCategory, TestPhase};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    HookType,
    Emotion,
    Pacing,
    CreativeType,
    ProductCategory,
    TestPhase,
}

impl Attribute {
    pub const ALL: [Attribute; 6] = [
        Attribute::HookType,
        Attribute::Emotion,
        Attribute::Pacing,
        Attribute::CreativeType,
        Attribute::ProductCategory,
        Attribute::TestPhase,
    ];
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::HookType => "hook_type",
            Self::Emotion => "emotion",
            Self::Pacing => "pacing",
            Self::CreativeType => "creative_type",
            Self::ProductCategory => "product_category",
            Self::TestPhase => "test_phase",
        };
        f.write_str(value)
    }
}

/// Lookup key into the transition table. `None` marks an attribute dropped
/// by back-off; the all-`None` key is the global prior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey {
    pub hook_type: Option<SmolStr>,
    pub emotion: Option<SmolStr>,
    pub pacing: Option<SmolStr>,
    pub creative_type: Option<SmolStr>,
    pub product_category: Option<ProductCategory>,
    pub test_phase: Option<TestPhase>,
}

impl StateKey {
    pub fn full(attrs: &CreativeAttributes) -> Self {
        Self {
            hook_type: Some(attrs.hook_type.clone()),
            emotion: Some(attrs.emotion.clone()),
            pacing: Some(attrs.pacing.clone()),
            creative_type: Some(attrs.creative_type.clone()),
            product_category: Some(attrs.product_category),
            test_phase: Some(attrs.test_phase),
        }
    }

    pub fn global() -> Self {
        Self::default()
    }

    pub fn is_global(&self) -> bool {
        self.specified() == 0
    }

    pub fn specified(&self) -> usize {
        [
            self.hook_type.is_some(),
            self.emotion.is_some(),
            self.pacing.is_some(),
            self.creative_type.is_some(),
            self.product_category.is_some(),
            self.test_phase.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    pub fn without(mut self, attr: Attribute) -> Self {
        match attr {
            Attribute::HookType => self.hook_type = None,
            Attribute::Emotion => self.emotion = None,
            Attribute::Pacing => self.pacing = None,
            Attribute::CreativeType => self.creative_type = None,
            Attribute::ProductCategory => self.product_category = None,
            Attribute::TestPhase => self.test_phase = None,
        }
        self
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            return f.write_str("*");
        }
        fn slot<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map_or_else(|| "*".to_string(), |x| x.to_string())
        }
        write!(
            f,
            "hook_type={}|emotion={}|pacing={}|creative_type={}|product_category={}|test_phase={}",
            slot(&self.hook_type),
            slot(&self.emotion),
            slot(&self.pacing),
            slot(&self.creative_type),
            slot(&self.product_category),
            slot(&self.test_phase),
        )
    }
}

pub fn default_backoff_order() -> Vec<Attribute> {
    vec![
        Attribute::TestPhase,
        Attribute::CreativeType,
        Attribute::Pacing,
        Attribute::Emotion,
        Attribute::ProductCategory,
        Attribute::HookType,
    ]
}

/// Ordered coarsening steps. Step `i` drops `order[i]` from the key produced
/// by step `i - 1`; after the last step only the global prior remains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffChain {
    order: Vec<Attribute>,
}

impl BackoffChain {
    /// `order` must name every attribute exactly once.
    pub fn new(order: Vec<Attribute>) -> CoreResult<Self> {
        if order.len() != Attribute::ALL.len() {
            return Err(CoreError::Config(format!(
                "backoff_order must list all {} attributes, got {}",
                Attribute::ALL.len(),
                order.len()
            )));
        }
        for attr in Attribute::ALL {
            if !order.contains(&attr) {
                return Err(CoreError::Config(format!(
                    "backoff_order is missing {attr}"
                )));
            }
        }
        Ok(Self { order })
    }

    pub fn order(&self) -> &[Attribute] {
        &self.order
    }

    /// Number of keys a lookup may visit, including the full key and the global prior.
    pub fn levels(&self) -> usize {
        self.order.len() + 1
    }

    /// Key at `level`: level 0 is `full` itself, the last level is global.
    pub fn coarsen(&self, full: &StateKey, level: usize) -> StateKey {
        self.order
            .iter()
            .take(level)
            .fold(full.clone(), |key, attr| key.without(*attr))
    }

    pub fn keys<'a>(&'a self, full: &'a StateKey) -> impl Iterator<Item = StateKey> + 'a {
        (0..self.levels()).map(move |level| self.coarsen(full, level))
    }
}

impl Default for BackoffChain {
    fn default() -> Self {
        Self {
            order: default_backoff_order(),
        }
    }
}
