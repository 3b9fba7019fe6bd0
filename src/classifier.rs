use crate::channels::{ChannelEntry, SelectedChannel};
use crate::settings::CategoryConfig;

/// Keyword based category assignment. Rules are tried in declared order and
/// the first rule with a keyword contained in the name wins.
pub struct Classifier {
    config: CategoryConfig,
}

impl Classifier {
    pub fn new(config: CategoryConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, name: &str) -> &str {
        self.config
            .rules
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| name.contains(k.as_str())))
            .map(|rule| rule.name.as_str())
            .unwrap_or(self.config.default_category.as_str())
    }

    /// Category names in output order: declared rules, then the catch-all.
    pub fn category_order(&self) -> Vec<&str> {
        let mut order: Vec<&str> = self.config.rules.iter().map(|r| r.name.as_str()).collect();
        if !order.contains(&self.config.default_category.as_str()) {
            order.push(self.config.default_category.as_str());
        }
        order
    }

    pub fn classify_all(&self, selected: Vec<SelectedChannel>) -> Vec<ChannelEntry> {
        selected
            .into_iter()
            .map(|channel| ChannelEntry {
                category: self.classify(&channel.name).to_string(),
                name: channel.name,
                sources: channel.sources,
            })
            .collect()
    }
}
