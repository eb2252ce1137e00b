//! Name and alias lookup for the built-in integrators
//!
//! Each integrator describes itself (name, aliases, order), so the registry
//! only indexes what it is given. Integrators are stateless, so `create`
//! hands out a fresh box every time.

use super::Integrator;
use bevy::prelude::*;
use std::collections::HashMap;

#[derive(Resource)]
pub struct IntegratorRegistry {
    /// Integrators in registration order
    integrators: Vec<Box<dyn Integrator>>,
    /// Canonical names and aliases to an index into `integrators`
    lookup: HashMap<&'static str, usize>,
}

impl IntegratorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            integrators: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    pub fn with_standard_integrators(mut self) -> Self {
        use super::{ExplicitEuler, Heun, RungeKuttaFourthOrder, RungeKuttaSecondOrderMidpoint};

        self.register_integrator(Box::new(ExplicitEuler));
        self.register_integrator(Box::new(Heun));
        self.register_integrator(Box::new(RungeKuttaSecondOrderMidpoint));
        self.register_integrator(Box::new(RungeKuttaFourthOrder));

        self
    }

    pub fn with_integrator(mut self, integrator: Box<dyn Integrator>) -> Self {
        self.register_integrator(integrator);
        self
    }

    /// Register an integrator, replacing any earlier one with the same name
    pub fn register_integrator(&mut self, integrator: Box<dyn Integrator>) {
        let index = match self.lookup.get(integrator.name()) {
            Some(&existing) if self.integrators[existing].name() == integrator.name() => {
                self.integrators[existing] = integrator;
                existing
            }
            _ => {
                self.integrators.push(integrator);
                self.integrators.len() - 1
            }
        };

        let integrator = &self.integrators[index];
        self.lookup.insert(integrator.name(), index);
        for alias in integrator.aliases() {
            self.lookup.insert(alias, index);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn Integrator>, String> {
        self.lookup
            .get(name)
            .map(|&index| self.integrators[index].clone_box())
            .ok_or_else(|| {
                let aliases: Vec<String> = self
                    .list_aliases()
                    .into_iter()
                    .map(|(alias, _)| alias)
                    .collect();
                format!(
                    "Unknown integrator: '{}'. Available integrators: {}. Aliases: {}",
                    name,
                    self.list_available().join(", "),
                    aliases.join(", ")
                )
            })
    }

    /// Canonical names, sorted
    pub fn list_available(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .integrators
            .iter()
            .map(|integrator| integrator.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// `(alias, canonical name)` pairs, sorted by alias
    pub fn list_aliases(&self) -> Vec<(String, String)> {
        let mut aliases: Vec<(String, String)> = self
            .lookup
            .iter()
            .filter_map(|(&key, &index)| {
                let canonical = self.integrators[index].name();
                (key != canonical).then(|| (key.to_string(), canonical.to_string()))
            })
            .collect();
        aliases.sort();
        aliases
    }

    /// Human-readable table used by `--list-integrators`
    pub fn describe(&self) -> String {
        let mut lines = Vec::with_capacity(self.integrators.len());
        for name in self.list_available() {
            if let Some(&index) = self.lookup.get(name.as_str()) {
                let integrator = &self.integrators[index];
                let aliases = integrator.aliases();
                let aliases = if aliases.is_empty() {
                    String::new()
                } else {
                    format!(" (aliases: {})", aliases.join(", "))
                };
                lines.push(format!(
                    "{:<26} order {}, {} stage(s){}",
                    name,
                    integrator.convergence_order(),
                    integrator.stages(),
                    aliases
                ));
            }
        }
        lines.join("\n")
    }
}

impl Default for IntegratorRegistry {
    fn default() -> Self {
        Self::new().with_standard_integrators()
    }
}
