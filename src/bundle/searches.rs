// src/bundle/searches.rs

//! Search evaluation order
//!
//! Searches run in authoring order except that a search with a parent
//! (`SearchRelation`) always runs after that parent.

use crate::data::IntermediateSection;
use crate::data::symbols::{SearchKind, SearchRelationSymbol, SearchSymbol};
use crate::messaging::{MessageId, Messaging};
use std::collections::{BTreeMap, HashMap};

/// Searches in evaluation order plus extension searches by extension id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedSearches {
    /// Arena indexes of every search in evaluation order
    pub order: Vec<usize>,
    pub extension_searches: BTreeMap<String, Vec<usize>>,
}

/// Order the searches of a section
pub fn order_searches(section: &IntermediateSection, messaging: &mut Messaging) -> OrderedSearches {
    let searches: Vec<(usize, String)> = section
        .iter::<SearchSymbol>()
        .filter_map(|(i, s, _)| s.id.clone().map(|id| (i, id)))
        .collect();
    let position: HashMap<&str, usize> = searches
        .iter()
        .enumerate()
        .map(|(pos, (_, id))| (id.as_str(), pos))
        .collect();

    let mut parent_of: Vec<Option<usize>> = vec![None; searches.len()];
    for (_, symbol, relation) in section.iter::<SearchRelationSymbol>() {
        let child = position.get(relation.search_ref.as_str());
        let parent = position.get(relation.parent_search_ref.as_str());
        match (child, parent) {
            (Some(&child), Some(&parent)) => parent_of[child] = Some(parent),
            _ => messaging.error(
                MessageId::InvalidSearchOrder,
                symbol.source_line.as_ref(),
                format!(
                    "Search relation {} -> {} references an undefined search",
                    relation.parent_search_ref, relation.search_ref
                ),
            ),
        }
    }

    // Depth-first from each search in authoring order, parents first
    let mut state = vec![Visit::Pending; searches.len()];
    let mut ordered = Vec::with_capacity(searches.len());
    for start in 0..searches.len() {
        let mut chain = Vec::new();
        let mut current = Some(start);
        while let Some(pos) = current {
            match state[pos] {
                Visit::Done => break,
                Visit::Active => {
                    messaging.error(
                        MessageId::InvalidSearchOrder,
                        section.symbol(searches[pos].0).source_line.as_ref(),
                        format!("Search {} is part of a parent cycle", searches[pos].1),
                    );
                    break;
                }
                Visit::Pending => {
                    state[pos] = Visit::Active;
                    chain.push(pos);
                    current = parent_of[pos];
                }
            }
        }
        for pos in chain.into_iter().rev() {
            state[pos] = Visit::Done;
            ordered.push(searches[pos].0);
        }
    }

    let mut extension_searches: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for &index in &ordered {
        if let Some(search) = section.get::<SearchSymbol>(index)
            && let SearchKind::Extension { extension_id, .. } = &search.kind
        {
            extension_searches
                .entry(extension_id.clone())
                .or_default()
                .push(index);
        }
    }

    OrderedSearches {
        order: ordered,
        extension_searches,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Pending,
    Active,
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SectionType;

    fn search(section: &mut IntermediateSection, id: &str, kind: SearchKind) -> usize {
        section.add(
            Some(id),
            None,
            SearchSymbol {
                variable: Some(format!("{id}Var")),
                condition: None,
                kind,
            },
        )
    }

    fn relate(section: &mut IntermediateSection, child: &str, parent: &str) {
        section.add(
            None,
            None,
            SearchRelationSymbol {
                search_ref: child.into(),
                parent_search_ref: parent.into(),
                only_if_parent: false,
            },
        );
    }

    #[test]
    fn test_parent_runs_first() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        let child = search(&mut section, "Child", SearchKind::default());
        let plain = search(&mut section, "Plain", SearchKind::default());
        let parent = search(
            &mut section,
            "Parent",
            SearchKind::Extension {
                extension_id: "NetFx".into(),
                data: None,
            },
        );
        relate(&mut section, "Child", "Parent");

        let mut messaging = Messaging::new();
        let searches = order_searches(&section, &mut messaging);
        assert!(!messaging.encountered_error());
        assert_eq!(searches.order, vec![parent, child, plain]);
        assert_eq!(searches.extension_searches["NetFx"], vec![parent]);
    }

    #[test]
    fn test_cycle_is_error() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        search(&mut section, "A", SearchKind::default());
        search(&mut section, "B", SearchKind::default());
        relate(&mut section, "A", "B");
        relate(&mut section, "B", "A");

        let mut messaging = Messaging::new();
        let searches = order_searches(&section, &mut messaging);
        assert_eq!(messaging.count(MessageId::InvalidSearchOrder), 1);
        assert_eq!(searches.order.len(), 2);
    }

    #[test]
    fn test_undefined_parent_is_error() {
        let mut section = IntermediateSection::new("b", SectionType::Bundle);
        search(&mut section, "A", SearchKind::default());
        relate(&mut section, "A", "Missing");
        let mut messaging = Messaging::new();
        order_searches(&section, &mut messaging);
        assert!(messaging.encountered_error());
    }
}
