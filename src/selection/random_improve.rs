use std::cell::RefCell;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::UtxoSelector;
use crate::builder::fee::{max_tx_fee, min_lovelace};
use crate::builder::TxBuilderError;
use crate::context::ChainContext;
use crate::primitives::{AssetName, PolicyId, Utxo, Value};

/// Random-Improve selection generalized to multi-asset values.
///
/// The request is split into one sub-request per asset, lovelace last.
/// Phase one covers each sub-request with uniformly drawn candidates.
/// Phase two keeps drawing and accepts a candidate when it moves the
/// selection closer to twice the sub-request without passing three times
/// it, which leaves roomy change and counteracts utxo fragmentation over
/// time.
pub struct RandomImproveMultiAsset {
    rng: RefCell<StdRng>,
}

impl RandomImproveMultiAsset {
    pub fn new() -> Self {
        Self {
            rng: RefCell::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic selection for tests and replayable builds.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn draw(&self, remaining: &mut Vec<Utxo>) -> Result<Utxo, TxBuilderError> {
        if remaining.is_empty() {
            return Err(TxBuilderError::UtxoSelection("input utxos depleted".into()));
        }
        let i = self.rng.borrow_mut().gen_range(0..remaining.len());
        Ok(remaining.swap_remove(i))
    }
}

impl Default for RandomImproveMultiAsset {
    fn default() -> Self {
        Self::new()
    }
}

/// One component of a split request: plain lovelace or a single asset.
enum SubRequest {
    Lovelace(i64),
    Token(PolicyId, AssetName, i64),
}

impl SubRequest {
    fn target(&self) -> i64 {
        match self {
            SubRequest::Lovelace(quantity) => *quantity,
            SubRequest::Token(_, _, quantity) => *quantity,
        }
    }

    fn quantity_in(&self, value: &Value) -> i64 {
        match self {
            SubRequest::Lovelace(_) => value.coin,
            SubRequest::Token(policy, name, _) => value.multi_asset.quantity(policy, name),
        }
    }
}

fn split_by_asset(value: &Value) -> Vec<SubRequest> {
    let mut requests = Vec::new();
    for (policy, assets) in value.multi_asset.iter() {
        for (name, quantity) in assets.iter() {
            requests.push(SubRequest::Token(*policy, name.clone(), *quantity));
        }
    }
    requests.push(SubRequest::Lovelace(value.coin));
    requests
}

impl UtxoSelector for RandomImproveMultiAsset {
    fn select(
        &self,
        utxos: &[Utxo],
        requested: &Value,
        context: &dyn ChainContext,
    ) -> Result<(Vec<Utxo>, Value), TxBuilderError> {
        let pparams = context.protocol_param();
        let mut remaining = utxos.to_vec();

        let mut total_requested = requested.clone();
        total_requested.coin += max_tx_fee(pparams) as i64;

        let requests = split_by_asset(&total_requested);

        let mut selected = Vec::new();
        let mut selected_amount = Value::default();

        // Phase one: cover every sub-request.
        for request in &requests {
            while request.quantity_in(&selected_amount) < request.target() {
                let utxo = self.draw(&mut remaining)?;
                selected_amount += utxo.output.amount.clone();
                selected.push(utxo);
            }
        }

        // Phase two: improve toward the ideal. Each candidate is considered
        // once and discarded whether or not it is taken.
        for request in &requests {
            let target = request.target();
            if target <= 0 {
                continue;
            }
            let ideal = target * 2;
            let upper_bound = target * 3;

            while !remaining.is_empty() {
                let have = request.quantity_in(&selected_amount);
                if ideal - have <= 0 {
                    break;
                }
                let utxo = self.draw(&mut remaining)?;
                let gain = request.quantity_in(&utxo.output.amount);
                if (ideal - have - gain).abs() < (ideal - have).abs()
                    && have + gain <= upper_bound
                {
                    selected_amount += utxo.output.amount.clone();
                    selected.push(utxo);
                }
            }
        }

        // The change implied by this selection must be able to pay its own
        // minimum deposit.
        let mut change = residual(&selected_amount, &total_requested);
        while change.coin < min_lovelace(&change, pparams) as i64 {
            let utxo = self.draw(&mut remaining)?;
            selected_amount += utxo.output.amount.clone();
            selected.push(utxo);
            change = residual(&selected_amount, &total_requested);
        }

        Ok((selected, change))
    }
}

fn residual(selected_amount: &Value, total_requested: &Value) -> Value {
    let mut change = selected_amount.clone() - total_requested.clone();
    change.multi_asset = change.multi_asset.filter(|_, _, quantity| quantity > 0);
    change
}
