use std::{collections::HashMap, sync::Arc};

use {
    mirror_common::ChannelId,
    mirror_config::{RedirectConfig, RouteOptions},
    tracing::{debug, warn},
};

use crate::{Error, Result};

/// Where a source message goes and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub destination: ChannelId,
    /// Shared by every pair expanded from the same redirect group.
    pub options: Arc<RouteOptions>,
}

/// Source channel → ordered list of routes.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: HashMap<ChannelId, Vec<RouteEntry>>,
    /// Sources in first-seen order, for deterministic iteration.
    order: Vec<ChannelId>,
}

impl RoutingTable {
    /// Expand redirect groups into routes.
    ///
    /// Fails on any group with an empty `sources`/`destinations` list or a
    /// non-numeric channel id.
    pub fn build(redirects: &[RedirectConfig]) -> Result<Self> {
        let mut table = Self::default();

        for (index, redirect) in redirects.iter().enumerate() {
            if redirect.sources.is_empty() {
                return Err(Error::EmptySources { index });
            }
            if redirect.destinations.is_empty() {
                return Err(Error::EmptyDestinations { index });
            }

            let sources = parse_ids(index, &redirect.sources)?;
            let destinations = parse_ids(index, &redirect.destinations)?;
            let options = Arc::new(redirect.options.clone());

            for source in &sources {
                for destination in &destinations {
                    table.insert(*source, *destination, &options);
                }
            }
        }

        debug!(
            redirects = redirects.len(),
            sources = table.order.len(),
            routes = table.len(),
            "routing table built"
        );
        Ok(table)
    }

    fn insert(&mut self, source: ChannelId, destination: ChannelId, options: &Arc<RouteOptions>) {
        let entries = self.routes.entry(source).or_insert_with(|| {
            self.order.push(source);
            Vec::new()
        });

        if entries.iter().any(|e| e.destination == destination) {
            warn!(
                source = %source,
                destination = %destination,
                "duplicate redirect dropped, first definition wins"
            );
            return;
        }

        entries.push(RouteEntry {
            destination,
            options: Arc::clone(options),
        });
    }

    /// Routes for `source`; empty when the channel is not relayed.
    #[must_use]
    pub fn lookup(&self, source: ChannelId) -> &[RouteEntry] {
        self.routes.get(&source).map_or(&[], Vec::as_slice)
    }

    /// Distinct sources in first-seen order.
    pub fn sources(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.order.iter().copied()
    }

    /// Distinct destinations in first-seen order.
    #[must_use]
    pub fn destinations(&self) -> Vec<ChannelId> {
        let mut seen = Vec::new();
        for entry in self.order.iter().flat_map(|s| self.lookup(*s)) {
            if !seen.contains(&entry.destination) {
                seen.push(entry.destination);
            }
        }
        seen
    }

    /// How many recent messages of `source` are worth re-checking for edits:
    /// the largest tracking bound among its routes that track changes.
    #[must_use]
    pub fn poll_depth(&self, source: ChannelId) -> usize {
        self.lookup(source)
            .iter()
            .filter(|e| e.options.tracks_changes())
            .map(|e| e.options.edit_tracking_max_msg)
            .max()
            .unwrap_or(0)
    }

    /// Total number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn parse_ids(index: usize, raw: &[String]) -> Result<Vec<ChannelId>> {
    raw.iter()
        .map(|value| {
            value.parse().map_err(|_| Error::InvalidChannelId {
                index,
                value: value.clone(),
            })
        })
        .collect()
}
