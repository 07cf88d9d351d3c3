//! Data augmentation by span substitution.
//!
//! Augmentations return the original example followed by up to `n_augs` distinct variants in
//! which a random subset of spans has been replaced. Replacing a span rewrites the example text
//! and shifts every later offset, so augmented examples are always well formed. Token
//! information cannot be kept consistent and is cleared on augmented copies.
//!
//! Randomness is seeded from the `seed` argument and the example hash, so applying the same
//! augmentation to the same data is reproducible.

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Value, json};

use super::operation::{
    ExampleContext, Operation, OperationFactory, Outcome, PreparedOperation, Preprocessor,
};
use super::params::{Param, ParamType, ResolvedArgs};
use crate::error::{ReconError, Result};
use crate::types::{Example, Span, char_slice};

pub const ENT_LABEL_SUB: &str = "recon.v1.augment.ent_label_sub";
pub const KB_EXPANSION: &str = "recon.v1.augment.kb_expansion";
pub const SPAN_KB_IDS: &str = "recon.v1.span_kb_ids";

/// Replace the spans at the given indices with new text.
///
/// Offsets are character offsets. A substitution that overlaps an earlier one (by start) is
/// skipped, and spans overlapping a substituted span are removed since their text no longer
/// exists.
pub fn substitute_spans(example: &Example, subs: &BTreeMap<usize, String>) -> Example {
    let chars: Vec<char> = example.text.chars().collect();

    let mut order: Vec<usize> = subs
        .keys()
        .copied()
        .filter(|&i| i < example.spans.len())
        .collect();
    order.sort_by_key(|&i| (example.spans[i].start, example.spans[i].end));

    // (original start, original end, replacement length) of applied substitutions
    let mut applied: Vec<(usize, usize, usize)> = Vec::with_capacity(order.len());
    let mut applied_idx = HashSet::new();
    let mut text = String::with_capacity(example.text.len());
    let mut cursor = 0;

    for i in order {
        let span = &example.spans[i];
        if span.start < cursor || span.end > chars.len() || span.start > span.end {
            continue;
        }
        let replacement = &subs[&i];
        text.extend(&chars[cursor..span.start]);
        text.push_str(replacement);
        cursor = span.end;
        applied.push((span.start, span.end, replacement.chars().count()));
        applied_idx.insert(i);
    }
    text.extend(&chars[cursor.min(chars.len())..]);

    let shift_before = |pos: usize| -> isize {
        applied
            .iter()
            .filter(|(_, end, _)| *end <= pos)
            .map(|(start, end, len)| *len as isize - (end - start) as isize)
            .sum()
    };

    let mut spans = Vec::with_capacity(example.spans.len());
    for (i, span) in example.spans.iter().enumerate() {
        let shift = shift_before(span.start);
        let start = (span.start as isize + shift).max(0) as usize;
        let mut new_span = Span {
            token_start: None,
            token_end: None,
            ..span.clone()
        };
        if applied_idx.contains(&i) {
            let replacement = &subs[&i];
            new_span.start = start;
            new_span.end = start + replacement.chars().count();
            new_span.text = replacement.clone();
        } else if applied
            .iter()
            .any(|(s, e, _)| span.start.max(*s) < span.end.min(*e))
        {
            continue;
        } else {
            new_span.start = start;
            new_span.end = start + span.len();
            if new_span.text.is_empty() {
                new_span.text = char_slice(&example.text, span.start, span.end).unwrap_or_default();
            }
        }
        spans.push(new_span);
    }

    Example {
        text,
        spans,
        tokens: None,
        meta: example.meta.clone(),
        formatted: example.formatted,
        data: example.data.clone(),
    }
}

fn check_prob(sub_prob: f64) -> Result<()> {
    if (0.0..=1.0).contains(&sub_prob) {
        Ok(())
    } else {
        Err(ReconError::operation(format!(
            "sub_prob of {sub_prob} is not allowed, expected a value between 0 and 1"
        )))
    }
}

/// Generate augmented variants of `example`.
///
/// For each round, `ceil(candidates * sub_prob)` candidate spans are picked at random and
/// `pick` proposes a replacement for each one (or `None` to leave it). Stops early when no
/// replacement is proposed.
pub fn augment_example<F>(
    example: &Example,
    candidates: &[usize],
    n_augs: usize,
    sub_prob: f64,
    rng: &mut fastrand::Rng,
    mut pick: F,
) -> Result<Vec<Example>>
where
    F: FnMut(&Span, &mut fastrand::Rng) -> Option<String>,
{
    check_prob(sub_prob)?;

    let mut seen = HashSet::from([example.hash()]);
    let mut out = vec![example.clone()];
    let n_sub = (candidates.len() as f64 * sub_prob).ceil() as usize;

    for _ in 0..n_augs {
        let mut chosen = candidates.to_vec();
        rng.shuffle(&mut chosen);
        chosen.truncate(n_sub);

        let mut subs = BTreeMap::new();
        for idx in chosen {
            if let Some(replacement) = pick(&example.spans[idx], rng) {
                subs.insert(idx, replacement);
            }
        }
        if subs.is_empty() {
            break;
        }

        let augmented = substitute_spans(example, &subs);
        if seen.insert(augmented.hash()) {
            out.push(augmented);
        }
    }

    Ok(out)
}

fn seeded_rng(seed: u64, example: &Example) -> fastrand::Rng {
    fastrand::Rng::with_seed(seed ^ example.hash().as_u64())
}

/// Replace spans labeled `label` with random entries of `subs`.
pub fn ent_label_sub(
    example: &Example,
    label: &str,
    subs: &[String],
    n_augs: usize,
    sub_prob: f64,
    seed: u64,
) -> Result<Vec<Example>> {
    let candidates: Vec<usize> = example
        .spans
        .iter()
        .enumerate()
        .filter(|(_, s)| s.label == label)
        .map(|(i, _)| i)
        .collect();

    let mut rng = seeded_rng(seed, example);
    augment_example(example, &candidates, n_augs, sub_prob, &mut rng, |span, rng| {
        let options: Vec<&String> = subs.iter().filter(|s| **s != span.text).collect();
        if options.is_empty() {
            None
        } else {
            Some(options[rng.usize(..options.len())].clone())
        }
    })
}

/// Knowledge base entity with its aliases.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Lists the `kb_id` of every span (or `null`) for each example.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanKbIds;

impl Preprocessor for SpanKbIds {
    fn name(&self) -> &str {
        SPAN_KB_IDS
    }

    fn run(&self, examples: &[Example]) -> Result<Vec<Value>> {
        Ok(examples
            .iter()
            .map(|e| json!(e.spans.iter().map(|s| s.kb_id.clone()).collect::<Vec<_>>()))
            .collect())
    }
}

/// Builds the alias lookup for [`KB_EXPANSION`].
#[derive(Debug, Clone, Copy, Default)]
pub struct KbExpansionFactory;

impl OperationFactory for KbExpansionFactory {
    fn prepare(
        &self,
        _examples: &[Example],
        preprocessed: &[IndexMap<String, Value>],
        args: &ResolvedArgs,
    ) -> Result<Box<dyn PreparedOperation>> {
        let entities: Vec<Entity> = args.get("entities")?;

        let linked: HashSet<String> = preprocessed
            .iter()
            .filter_map(|outputs| outputs.get(SPAN_KB_IDS))
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        let aliases: IndexMap<String, Vec<String>> = entities
            .into_iter()
            .filter(|e| linked.contains(&e.id) && !e.aliases.is_empty())
            .map(|e| (e.id, e.aliases))
            .collect();

        Ok(Box::new(KbExpansion { aliases }))
    }
}

/// Prepared kb expansion. Aliases are consumed as they are used, so each alias is substituted
/// at most once over a dataset.
struct KbExpansion {
    aliases: IndexMap<String, Vec<String>>,
}

impl PreparedOperation for KbExpansion {
    fn apply(
        &mut self,
        example: Example,
        args: &ResolvedArgs,
        ctx: &ExampleContext<'_>,
    ) -> Result<Outcome> {
        let n_augs: usize = args.get("n_augs")?;
        let sub_prob: f64 = args.get("sub_prob")?;
        let seed: u64 = args.get("seed")?;

        let kb_ids: Vec<Option<String>> = match ctx.preprocessed(SPAN_KB_IDS) {
            Some(value) => serde_json::from_value(value.clone())?,
            None => Vec::new(),
        };
        let candidates: Vec<usize> = kb_ids
            .iter()
            .enumerate()
            .filter(|(_, id)| id.as_ref().is_some_and(|id| self.aliases.contains_key(id)))
            .map(|(i, _)| i)
            .filter(|&i| i < example.spans.len())
            .collect();

        let mut rng = seeded_rng(seed, &example);
        let aliases = &mut self.aliases;
        let out = augment_example(
            &example,
            &candidates,
            n_augs,
            sub_prob,
            &mut rng,
            |span, rng| {
                let pool = aliases.get_mut(span.kb_id.as_deref()?)?;
                let options: Vec<usize> =
                    (0..pool.len()).filter(|&i| pool[i] != span.text).collect();
                if options.is_empty() {
                    return None;
                }
                Some(pool.remove(options[rng.usize(..options.len())]))
            },
        )?;

        Ok(Outcome::Many(out))
    }
}

fn augmentation_params() -> Vec<Param> {
    vec![
        Param::optional("n_augs", ParamType::Int, 1).at_least(0.0),
        Param::optional("sub_prob", ParamType::Float, 0.5).with_range(0.0, 1.0),
        Param::optional("seed", ParamType::Int, 0).at_least(0.0),
    ]
}

pub(crate) fn operations() -> Vec<Operation> {
    vec![
        Operation::per_example(ENT_LABEL_SUB, |example, args, _| {
            let label: String = args.get("label")?;
            let subs: Vec<String> = args.get("subs")?;
            let out = ent_label_sub(
                &example,
                &label,
                &subs,
                args.get("n_augs")?,
                args.get("sub_prob")?,
                args.get("seed")?,
            )?;
            Ok(Outcome::Many(out))
        })
        .with_param(Param::required("label", ParamType::Str))
        .with_param(Param::required("subs", ParamType::list(ParamType::Str)))
        .with_params(augmentation_params())
        .with_handles_tokens(false),
        Operation::factory(KB_EXPANSION, KbExpansionFactory)
            .with_param(Param::required(
                "entities",
                ParamType::list(ParamType::Record(vec![
                    Param::required("id", ParamType::Str),
                    Param::optional("aliases", ParamType::list(ParamType::Str), json!([])),
                ])),
            ))
            .with_params(augmentation_params())
            .with_preprocessor(SpanKbIds)
            .with_handles_tokens(false),
    ]
}
