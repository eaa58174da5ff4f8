//! Seed Linker
//!
//! Matches curated seeds to merged forms by derived term. The seed name is
//! tried first, then each alias; for every query the tiers run in order and
//! the first tier yielding a candidate wins. A matched seed's specs are
//! attached as the form's override. Unmatched seeds are persisted as orphans.
//!
//! A form takes at most one seed per run: the first seed in load order keeps
//! it, and a later seed resolving to the same form is recorded as an orphan.

use crate::name_parser::{self, ParsedName};
use crate::pipeline::statistics::StageSummary;
use crate::pipeline::BatchCommitter;
use crate::seeds::Seed;
use crate::store::{MergedItemForm, SeedRecord, TermMatch, XrefStore};
use crate::types::ItemStatus;
use rmx_common::Result;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// What a seed query looks for
#[derive(Debug, Clone, PartialEq)]
pub struct SeedQuery {
    /// Stem to match against derived terms ("Shea Butter")
    pub term: String,
    pub physical_form: String,
    pub variation: String,
}

impl SeedQuery {
    pub fn from_name(name: &str, explicit_form: Option<&str>) -> Self {
        let ParsedName {
            stem,
            physical_form,
            variation,
            ..
        } = name_parser::parse(name, explicit_form);
        Self {
            term: stem,
            physical_form,
            variation,
        }
    }
}

/// Candidate ordering: lower sorts first
pub type Rank = (usize, bool, bool);

/// One matching tier
pub struct Tier {
    pub name: &'static str,
    pub mode: TermMatch,
    pub accept: fn(&SeedQuery, &MergedItemForm, usize) -> bool,
    pub rank: fn(&SeedQuery, &MergedItemForm) -> Rank,
}

fn mismatch(a: &str, b: &str) -> bool {
    !a.trim().eq_ignore_ascii_case(b.trim())
}

fn rank_exact(query: &SeedQuery, form: &MergedItemForm) -> Rank {
    (
        0,
        mismatch(&query.physical_form, &form.derived_physical_form),
        mismatch(&query.variation, &form.derived_variation),
    )
}

fn rank_shortest(query: &SeedQuery, form: &MergedItemForm) -> Rank {
    (
        form.derived_term.chars().count(),
        mismatch(&query.physical_form, &form.derived_physical_form),
        mismatch(&query.variation, &form.derived_variation),
    )
}

fn accept_any(_query: &SeedQuery, _form: &MergedItemForm, _slack: usize) -> bool {
    true
}

/// Substring matches only on terms not much longer than the query
fn accept_bounded(query: &SeedQuery, form: &MergedItemForm, slack: usize) -> bool {
    form.derived_term.chars().count() <= query.term.chars().count() + slack
}

/// Tiers in evaluation order
pub const TIERS: &[Tier] = &[
    Tier {
        name: "exact",
        mode: TermMatch::Exact,
        accept: accept_any,
        rank: rank_exact,
    },
    Tier {
        name: "prefix",
        mode: TermMatch::Prefix,
        accept: accept_any,
        rank: rank_shortest,
    },
    Tier {
        name: "substring",
        mode: TermMatch::Substring,
        accept: accept_bounded,
        rank: rank_shortest,
    },
];

/// Best candidate of one tier
pub fn pick<'a>(
    tier: &Tier,
    query: &SeedQuery,
    candidates: &'a [MergedItemForm],
    slack: usize,
) -> Option<&'a MergedItemForm> {
    // min_by_key keeps the first of equal ranks, i.e. store order
    candidates
        .iter()
        .filter(|form| (tier.accept)(query, form, slack))
        .min_by_key(|form| (tier.rank)(query, form))
}

/// A seed's resolved match
#[derive(Debug, Clone, PartialEq)]
pub struct SeedMatch {
    pub form: MergedItemForm,
    pub tier: &'static str,
}

pub struct SeedLinker {
    substring_slack: usize,
}

impl SeedLinker {
    pub fn new(substring_slack: usize) -> Self {
        Self { substring_slack }
    }

    /// Run every query of a seed through the tiers
    pub async fn find_match<S: XrefStore + ?Sized>(
        &self,
        store: &mut S,
        seed: &Seed,
    ) -> Result<Option<SeedMatch>> {
        let form_hint = seed.item.physical_form.as_deref();
        let names = std::iter::once(seed.name()).chain(seed.item.aliases.iter().map(String::as_str));

        for name in names {
            let query = SeedQuery::from_name(name, form_hint);
            if query.term.trim().is_empty() {
                continue;
            }
            for tier in TIERS {
                let candidates = store.find_merged_forms(&query.term, tier.mode).await?;
                if let Some(form) = pick(tier, &query, &candidates, self.substring_slack) {
                    debug!(seed = %seed.name(), query = %name, tier = tier.name, term = %form.derived_term, "Seed matched");
                    return Ok(Some(SeedMatch {
                        form: form.clone(),
                        tier: tier.name,
                    }));
                }
            }
        }
        Ok(None)
    }

    pub async fn run<S: XrefStore + ?Sized>(
        &self,
        store: &mut S,
        seeds: &[Seed],
        batch: &mut BatchCommitter,
        summary: &mut StageSummary,
    ) -> Result<()> {
        info!(seeds = seeds.len(), "Linking seeds");
        // cluster id -> seed name that claimed the form this run
        let mut claimed: HashMap<String, String> = HashMap::new();

        for seed in seeds {
            summary.processed += 1;
            let specs = seed.specs();

            let found = match self.find_match(store, seed).await? {
                Some(found) => match claimed.get(&found.form.cluster_id) {
                    Some(owner) => {
                        warn!(
                            seed = %seed.name(),
                            category = %seed.category,
                            owner = %owner,
                            term = %found.form.derived_term,
                            "Form already taken by an earlier seed"
                        );
                        None
                    }
                    None => Some(found),
                },
                None => None,
            };

            match found {
                Some(found) => {
                    claimed.insert(found.form.cluster_id.clone(), seed.name().to_string());
                    let already = found.form.seed_key.as_deref() == Some(seed.key.as_str())
                        && found.form.seed_specs.as_ref() == Some(&specs);
                    if !already {
                        store.clear_seed_override(&seed.key).await?;
                        store
                            .set_seed_override(&found.form.cluster_id, &seed.key, &specs)
                            .await?;
                        summary.changed += 1;
                    }
                    store
                        .upsert_seed(&SeedRecord {
                            key: seed.key.clone(),
                            category: seed.category.clone(),
                            name: seed.name().to_string(),
                            status: ItemStatus::Linked,
                            cluster_id: Some(found.form.cluster_id.clone()),
                            match_tier: Some(found.tier.to_string()),
                        })
                        .await?;
                    summary.matched += 1;
                }
                None => {
                    warn!(seed = %seed.name(), category = %seed.category, "Seed left unlinked, marked orphan");
                    if store.clear_seed_override(&seed.key).await? > 0 {
                        summary.changed += 1;
                    }
                    store
                        .upsert_seed(&SeedRecord {
                            key: seed.key.clone(),
                            category: seed.category.clone(),
                            name: seed.name().to_string(),
                            status: ItemStatus::Orphan,
                            cluster_id: None,
                            match_tier: None,
                        })
                        .await?;
                    summary.orphaned += 1;
                }
            }
            batch.tick(store).await?;
        }

        Ok(())
    }
}
