//! Sections and node order derived from canvas geometry.
//!
//! The form group is found by title. Groups nested fully inside it become
//! sections; nodes are assigned by their anchor point and ordered into rows by
//! vertical proximity. Nothing here is persisted except through the saved
//! `_order`, which overrides the spatial order within each section.

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{debug, trace};

use crate::{
    FormError, Result,
    config::LayoutConfig,
    graph::{GraphGroup, GraphNode, NodeId},
    settings::Palette,
};

/// Colors assigned to sections by discovery order.
pub const SECTION_PALETTE: [Palette; 8] = [
    Palette::Blue,
    Palette::Green,
    Palette::Purple,
    Palette::Orange,
    Palette::Teal,
    Palette::Pink,
    Palette::Yellow,
    Palette::Red,
];

/// Title of the section collecting nodes outside every sub-group.
pub const OTHER_SECTION: &str = "Other";

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    /// `None` for the synthetic "Other" section
    pub group: Option<GraphGroup>,
    pub title: String,
    pub color: Option<Palette>,
    pub nodes: Vec<GraphNode>,
}

impl Section {
    /// Stable key derived from the title, used for collapse state.
    pub fn key(&self) -> String {
        slug(&self.title)
    }

    pub fn is_synthetic(&self) -> bool {
        self.group.is_none()
    }
}

pub(crate) fn slug(title: &str) -> String {
    let mut out = String::new();
    for c in title.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let out = out.trim_end_matches('-').to_string();
    if out.is_empty() { "section".to_string() } else { out }
}

/// Why the form has nothing to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmptyState {
    NoFormGroup,
    EmptyFormGroup,
    NothingRenderable,
}

impl EmptyState {
    pub fn guidance(&self) -> &'static str {
        match self {
            EmptyState::NoFormGroup => "Create a group titled \"Mobile Form\" and move the nodes you want to control into it.",
            EmptyState::EmptyFormGroup => "The \"Mobile Form\" group is empty. Drag nodes into it to show their controls here.",
            EmptyState::NothingRenderable => "None of the nodes in the \"Mobile Form\" group have controls that can be shown.",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FormLayout {
    pub form_group: Option<GraphGroup>,
    pub output_group: Option<GraphGroup>,
    pub sections: Vec<Section>,
    pub empty: Option<EmptyState>,
}

impl FormLayout {
    /// Every laid-out node, section by section.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.sections.iter().flat_map(|s| s.nodes.iter())
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes().map(|n| n.id).collect()
    }
}

pub struct LayoutDeriver {
    form: Regex,
    mobile_outputs: Regex,
    outputs: Regex,
    row_gap: f64,
    group_row_tolerance: f64,
}

fn pattern(source: &str) -> Result<Regex> {
    RegexBuilder::new(source).case_insensitive(true).build().map_err(|e| FormError::Config(format!("invalid group pattern '{}': {}", source, e)))
}

impl LayoutDeriver {
    pub fn new(config: &LayoutConfig) -> Result<Self> {
        Ok(Self {
            form: pattern(&config.form_pattern)?,
            mobile_outputs: pattern(&config.mobile_outputs_pattern)?,
            outputs: pattern(&config.outputs_pattern)?,
            row_gap: config.row_gap,
            group_row_tolerance: config.group_row_tolerance,
        })
    }

    fn is_role_title(
        &self,
        title: &str,
    ) -> bool {
        self.form.is_match(title) || self.mobile_outputs.is_match(title) || self.outputs.is_match(title)
    }

    /// The first group whose title names the form.
    pub fn find_form_group<'a>(
        &self,
        groups: &'a [GraphGroup],
    ) -> Option<&'a GraphGroup> {
        let mut matches = groups.iter().filter(|g| self.form.is_match(&g.title));
        let first = matches.next()?;
        if matches.next().is_some() {
            debug!("several groups name the form, using '{}'", first.title);
        }
        Some(first)
    }

    /// The "mobile outputs" group, else a bare "outputs" group.
    pub fn find_output_group<'a>(
        &self,
        groups: &'a [GraphGroup],
    ) -> Option<&'a GraphGroup> {
        groups
            .iter()
            .find(|g| self.mobile_outputs.is_match(&g.title))
            .or_else(|| groups.iter().find(|g| !self.form.is_match(&g.title) && self.outputs.is_match(&g.title)))
    }

    /// Groups nested fully inside `form`, in reading order.
    pub fn sub_groups(
        &self,
        form: &GraphGroup,
        groups: &[GraphGroup],
    ) -> Vec<GraphGroup> {
        let mut nested: Vec<GraphGroup> =
            groups.iter().filter(|g| !self.is_role_title(&g.title) && form.bounding.contains_rect(&g.bounding)).cloned().collect();
        nested.sort_by(|a, b| a.bounding.y.total_cmp(&b.bounding.y).then(a.bounding.x.total_cmp(&b.bounding.x)));

        let mut bands: Vec<Vec<GraphGroup>> = Vec::new();
        for group in nested {
            match bands.last_mut() {
                Some(band) if group.bounding.y - band[0].bounding.y < self.group_row_tolerance => band.push(group),
                _ => bands.push(vec![group]),
            }
        }
        bands
            .into_iter()
            .flat_map(|mut band| {
                band.sort_by(|a, b| a.bounding.x.total_cmp(&b.bounding.x));
                band
            })
            .collect()
    }

    /// Cluster nodes into rows by vertical gap; each row is sorted by x.
    pub fn rows(
        &self,
        mut nodes: Vec<GraphNode>,
    ) -> Vec<Vec<GraphNode>> {
        nodes.sort_by(|a, b| a.pos[1].total_cmp(&b.pos[1]));

        let mut rows: Vec<Vec<GraphNode>> = Vec::new();
        let mut prev_y: Option<f64> = None;
        for node in nodes {
            let y = node.pos[1];
            match (rows.last_mut(), prev_y) {
                (Some(row), Some(prev)) if y - prev <= self.row_gap => row.push(node),
                _ => rows.push(vec![node]),
            }
            prev_y = Some(y);
        }
        for row in rows.iter_mut() {
            row.sort_by(|a, b| a.pos[0].total_cmp(&b.pos[0]));
        }
        rows
    }

    /// Rows flattened into reading order.
    pub fn spatial_order(
        &self,
        nodes: Vec<GraphNode>,
    ) -> Vec<GraphNode> {
        self.rows(nodes).into_iter().flatten().collect()
    }

    /// Derive sections for the form group. Never fails; missing groups and
    /// empty groups produce an [`EmptyState`].
    pub fn derive(
        &self,
        nodes: &[GraphNode],
        groups: &[GraphGroup],
        saved_order: &[NodeId],
    ) -> FormLayout {
        let output_group = self.find_output_group(groups).cloned();
        let Some(form) = self.find_form_group(groups).cloned() else {
            return FormLayout {
                output_group,
                empty: Some(EmptyState::NoFormGroup),
                ..Default::default()
            };
        };

        let mut remaining: Vec<GraphNode> = nodes.iter().filter(|n| form.contains_node(n)).cloned().collect();
        if remaining.is_empty() {
            return FormLayout {
                form_group: Some(form),
                output_group,
                empty: Some(EmptyState::EmptyFormGroup),
                ..Default::default()
            };
        }

        let mut sections = Vec::new();
        for (index, group) in self.sub_groups(&form, groups).into_iter().enumerate() {
            let (inside, outside): (Vec<GraphNode>, Vec<GraphNode>) = remaining.into_iter().partition(|n| group.contains_node(n));
            remaining = outside;
            if inside.is_empty() {
                trace!("sub-group '{}' holds no nodes", group.title);
                continue;
            }
            sections.push(Section {
                title: group.title.clone(),
                color: Some(SECTION_PALETTE[index % SECTION_PALETTE.len()]),
                nodes: apply_saved_order(self.spatial_order(inside), saved_order),
                group: Some(group),
            });
        }
        if !remaining.is_empty() {
            sections.push(Section {
                group: None,
                title: OTHER_SECTION.to_string(),
                color: None,
                nodes: apply_saved_order(self.spatial_order(remaining), saved_order),
            });
        }

        FormLayout {
            form_group: Some(form),
            output_group,
            sections,
            empty: None,
        }
    }
}

/// Put nodes listed in `order` first, in that order; the rest keep their
/// relative position.
pub fn apply_saved_order(
    nodes: Vec<GraphNode>,
    order: &[NodeId],
) -> Vec<GraphNode> {
    if order.is_empty() {
        return nodes;
    }
    let rank: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let (mut listed, unlisted): (Vec<GraphNode>, Vec<GraphNode>) = nodes.into_iter().partition(|n| rank.contains_key(&n.id));
    listed.sort_by_key(|n| rank[&n.id]);
    listed.extend(unlisted);
    listed
}
