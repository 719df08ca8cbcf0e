//! Split route optimization.
//!
//! Given per-route quotes for every fraction step, pick the set of
//! (route, fraction) pairs whose fractions sum to exactly 100% and whose gas
//! adjusted aggregate is best: highest output for exact input, lowest input
//! for exact output. The search is a bounded dynamic program over percent
//! steps, not a global optimum.

use {
    crate::{plan::RouteWithQuote, pools::Protocol},
    model::TradeType,
    num::{BigRational, Zero},
    tracing::instrument,
};

#[derive(Clone, Copy, Debug)]
pub struct SplitConfig {
    pub distribution_percent: u32,
    pub min_splits: usize,
    pub max_splits: usize,
    pub force_cross_protocol: bool,
}

/// Which protocols a partial plan draws from. Tracked in the DP state so the
/// cross protocol constraint can be answered exactly at the end.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Signature {
    Empty,
    Single(Protocol),
    Multi,
}

const SIGNATURES: usize = 7;

impl Signature {
    fn index(self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Single(Protocol::V2) => 1,
            Self::Single(Protocol::V3) => 2,
            Self::Single(Protocol::Stable) => 3,
            Self::Single(Protocol::StableWrapper) => 4,
            Self::Single(Protocol::Mixed) => 5,
            Self::Multi => 6,
        }
    }

    fn extend(self, protocol: Protocol) -> Self {
        match self {
            Self::Empty => Self::Single(protocol),
            Self::Single(existing) if existing == protocol => self,
            _ => Self::Multi,
        }
    }

    /// Whether a finished plan with this signature draws from more than one
    /// protocol. A single route tagged mixed already spans protocols.
    fn is_cross_protocol(self) -> bool {
        matches!(self, Self::Multi | Self::Single(Protocol::Mixed))
    }
}

#[derive(Clone, Debug)]
struct Partial {
    /// Indices into the candidate list.
    entries: Vec<usize>,
    /// Gas adjusted aggregate.
    value: BigRational,
}

/// Chooses the best split of the trade across the candidate (route, fraction)
/// quotes. Returns `None` when no combination fills exactly 100% within the
/// split window (or, with the cross protocol flag, none that qualifies).
#[instrument(skip_all, fields(candidates = candidates.len()))]
pub fn best_swap_route(
    candidates: &[RouteWithQuote],
    trade_type: TradeType,
    config: &SplitConfig,
) -> Option<Vec<RouteWithQuote>> {
    assert!(
        config.distribution_percent > 0 && 100 % config.distribution_percent == 0,
        "distribution percent must evenly divide 100"
    );
    let steps = (100 / config.distribution_percent) as usize;

    // Deterministic iteration order regardless of how quotes arrived.
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    let ids: Vec<String> = candidates
        .iter()
        .map(|candidate| candidate.route.id())
        .collect();
    order.sort_by(|a, b| {
        ids[*a]
            .cmp(&ids[*b])
            .then(candidates[*a].percent.cmp(&candidates[*b].percent))
    });

    let prefers_smaller = trade_type == TradeType::ExactOutput;
    let better = |candidate: &Partial, incumbent: &Option<Partial>| -> bool {
        let Some(incumbent) = incumbent else {
            return true;
        };
        match candidate.value.cmp(&incumbent.value) {
            std::cmp::Ordering::Greater => !prefers_smaller,
            std::cmp::Ordering::Less => prefers_smaller,
            std::cmp::Ordering::Equal => sorted_ids(candidate, &ids) < sorted_ids(incumbent, &ids),
        }
    };

    // dp[p][k][sig]: the best known plan of exactly k splits summing to
    // p percent steps.
    let mut dp: Vec<Vec<Vec<Option<Partial>>>> =
        vec![vec![vec![None; SIGNATURES]; config.max_splits + 1]; steps + 1];
    dp[0][0][Signature::Empty.index()] = Some(Partial {
        entries: Vec::new(),
        value: BigRational::zero(),
    });

    for p in 0..steps {
        for k in 0..config.max_splits {
            for sig in [Signature::Empty, Signature::Multi]
                .into_iter()
                .chain(Protocol::ALL.into_iter().map(Signature::Single))
            {
                let Some(partial) = dp[p][k][sig.index()].clone() else {
                    continue;
                };
                for &index in &order {
                    let candidate = &candidates[index];
                    if candidate.percent == 0 || candidate.percent % config.distribution_percent != 0
                    {
                        continue;
                    }
                    let p_next = p + (candidate.percent / config.distribution_percent) as usize;
                    if p_next > steps {
                        continue;
                    }
                    // One route may only appear once per plan.
                    if partial
                        .entries
                        .iter()
                        .any(|entry| ids[*entry] == ids[index])
                    {
                        continue;
                    }
                    let sig_next = sig.extend(candidate.route.protocol());
                    let mut entries = partial.entries.clone();
                    entries.push(index);
                    let extended = Partial {
                        value: &partial.value + candidate.quote_adjusted.as_rational(),
                        entries,
                    };
                    let cell = &mut dp[p_next][k + 1][sig_next.index()];
                    if better(&extended, cell) {
                        *cell = Some(extended);
                    }
                }
            }
        }
    }

    // Choose among the complete plans within the split window, preferring
    // better value, then fewer splits, then lexicographically smaller route
    // ids.
    let mut winner: Option<(usize, Partial)> = None;
    for k in config.min_splits..=config.max_splits {
        for sig in [Signature::Multi]
            .into_iter()
            .chain(Protocol::ALL.into_iter().map(Signature::Single))
        {
            if config.force_cross_protocol && !sig.is_cross_protocol() {
                continue;
            }
            let Some(plan) = &dp[steps][k][sig.index()] else {
                continue;
            };
            let wins = match &winner {
                None => true,
                Some((best_k, best)) => match plan.value.cmp(&best.value) {
                    std::cmp::Ordering::Greater => !prefers_smaller,
                    std::cmp::Ordering::Less => prefers_smaller,
                    std::cmp::Ordering::Equal => {
                        k < *best_k
                            || (k == *best_k && sorted_ids(plan, &ids) < sorted_ids(best, &ids))
                    }
                },
            };
            if wins {
                winner = Some((k, plan.clone()));
            }
        }
    }

    let (_, winner) = winner?;
    let mut routes: Vec<RouteWithQuote> = winner
        .entries
        .iter()
        .map(|index| candidates[*index].clone())
        .collect();
    routes.sort_by(|a, b| {
        b.percent
            .cmp(&a.percent)
            .then_with(|| a.route.id().cmp(&b.route.id()))
    });
    Some(routes)
}

fn sorted_ids(partial: &Partial, ids: &[String]) -> Vec<String> {
    let mut sorted: Vec<String> = partial
        .entries
        .iter()
        .map(|entry| ids[*entry].clone())
        .collect();
    sorted.sort();
    sorted
}
