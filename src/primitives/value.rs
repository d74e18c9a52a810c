use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::{Add, AddAssign, Deref, DerefMut, Sub, SubAssign};

use pallas::ledger::primitives::conway::Value as ConwayValue;
use pallas::ledger::primitives::{Fragment, PositiveCoin};

use super::{AssetName, PolicyId};
use crate::builder::TxBuilderError;

/// Quantities of the named assets under a single policy, ordered by the
/// bytes of their names.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct Asset(pub BTreeMap<AssetName, i64>);

impl Deref for Asset {
    type Target = BTreeMap<AssetName, i64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Asset {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<(AssetName, i64)> for Asset {
    fn from_iter<I: IntoIterator<Item = (AssetName, i64)>>(iter: I) -> Self {
        Asset(iter.into_iter().collect())
    }
}

impl AddAssign for Asset {
    fn add_assign(&mut self, rhs: Asset) {
        for (name, quantity) in rhs.0 {
            *self.0.entry(name).or_insert(0) += quantity;
        }
    }
}

impl SubAssign for Asset {
    fn sub_assign(&mut self, rhs: Asset) {
        for (name, quantity) in rhs.0 {
            *self.0.entry(name).or_insert(0) -= quantity;
        }
    }
}

impl Add for Asset {
    type Output = Asset;

    fn add(mut self, rhs: Asset) -> Asset {
        self += rhs;
        self
    }
}

impl Sub for Asset {
    type Output = Asset;

    fn sub(mut self, rhs: Asset) -> Asset {
        self -= rhs;
        self
    }
}

/// Native-token quantities keyed by minting policy, ordered by the bytes of
/// the policy hash. Arithmetic keeps zero entries around; callers strip
/// them with [`MultiAsset::filter`] before anything is serialized.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct MultiAsset(pub BTreeMap<PolicyId, Asset>);

impl Deref for MultiAsset {
    type Target = BTreeMap<PolicyId, Asset>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for MultiAsset {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<(PolicyId, Asset)> for MultiAsset {
    fn from_iter<I: IntoIterator<Item = (PolicyId, Asset)>>(iter: I) -> Self {
        MultiAsset(iter.into_iter().collect())
    }
}

impl MultiAsset {
    pub fn from_single(policy: PolicyId, assets: Asset) -> Self {
        MultiAsset(BTreeMap::from([(policy, assets)]))
    }

    /// Keep only the `(policy, name, quantity)` triples the predicate
    /// accepts; policies left without assets are dropped entirely.
    pub fn filter(&self, predicate: impl Fn(&PolicyId, &AssetName, i64) -> bool) -> MultiAsset {
        let mut filtered = MultiAsset::default();
        for (policy, assets) in self.0.iter() {
            for (name, quantity) in assets.iter() {
                if predicate(policy, name, *quantity) {
                    filtered
                        .entry(*policy)
                        .or_default()
                        .insert(name.clone(), *quantity);
                }
            }
        }
        filtered
    }

    pub fn contains(&self, policy: &PolicyId, name: &AssetName) -> bool {
        self.0
            .get(policy)
            .map(|assets| assets.contains_key(name))
            .unwrap_or(false)
    }

    /// Quantity of the given asset, zero when absent.
    pub fn quantity(&self, policy: &PolicyId, name: &AssetName) -> i64 {
        self.0
            .get(policy)
            .and_then(|assets| assets.get(name))
            .copied()
            .unwrap_or(0)
    }

    /// Every quantity in `self` is strictly below the corresponding one in
    /// `other` (absent entries count as zero).
    pub fn strictly_below(&self, other: &MultiAsset) -> bool {
        self.each_quantity(other, |a, b| a < b)
    }

    /// Every quantity in `self` is at most the corresponding one in `other`.
    pub fn covered_by(&self, other: &MultiAsset) -> bool {
        self.each_quantity(other, |a, b| a <= b)
    }

    fn each_quantity(&self, other: &MultiAsset, accept: impl Fn(i64, i64) -> bool) -> bool {
        self.0.iter().all(|(policy, assets)| {
            assets
                .iter()
                .all(|(name, quantity)| accept(*quantity, other.quantity(policy, name)))
        })
    }
}

impl AddAssign for MultiAsset {
    fn add_assign(&mut self, rhs: MultiAsset) {
        for (policy, assets) in rhs.0 {
            *self.0.entry(policy).or_default() += assets;
        }
    }
}

impl SubAssign for MultiAsset {
    fn sub_assign(&mut self, rhs: MultiAsset) {
        for (policy, assets) in rhs.0 {
            *self.0.entry(policy).or_default() -= assets;
        }
    }
}

impl Add for MultiAsset {
    type Output = MultiAsset;

    fn add(mut self, rhs: MultiAsset) -> MultiAsset {
        self += rhs;
        self
    }
}

impl Sub for MultiAsset {
    type Output = MultiAsset;

    fn sub(mut self, rhs: MultiAsset) -> MultiAsset {
        self -= rhs;
        self
    }
}

/// A lovelace amount together with any native tokens riding along.
///
/// The coin field is signed so that subtraction can express a deficit
/// mid-computation; a negative coin is unrepresentable in a finished
/// transaction and is rejected when the value is serialized.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct Value {
    pub coin: i64,
    pub multi_asset: MultiAsset,
}

impl Value {
    pub fn new(coin: i64) -> Self {
        Self {
            coin,
            multi_asset: MultiAsset::default(),
        }
    }

    pub fn with_assets(coin: i64, multi_asset: MultiAsset) -> Self {
        Self { coin, multi_asset }
    }

    pub fn is_empty(&self) -> bool {
        self.coin == 0 && self.multi_asset.is_empty()
    }

    /// Component-wise `self <= other`: enough of everything in `other` to
    /// pay out `self`.
    pub fn covered_by(&self, other: &Value) -> bool {
        self.coin <= other.coin && self.multi_asset.covered_by(&other.multi_asset)
    }

    /// The pallas wire value. Non-positive asset quantities are skipped;
    /// a negative coin is an error.
    pub fn build_conway(&self) -> Result<ConwayValue, TxBuilderError> {
        let coin = u64::try_from(self.coin)
            .map_err(|_| TxBuilderError::InvalidTransaction("value has a negative coin".into()))?;

        let mut assets: BTreeMap<PolicyId, BTreeMap<AssetName, PositiveCoin>> = BTreeMap::new();
        for (policy, policy_assets) in self.multi_asset.iter() {
            for (name, quantity) in policy_assets.iter() {
                let Some(amount) = u64::try_from(*quantity)
                    .ok()
                    .and_then(|quantity| PositiveCoin::try_from(quantity).ok())
                else {
                    continue;
                };
                assets.entry(*policy).or_default().insert(name.clone(), amount);
            }
        }

        if assets.is_empty() {
            Ok(ConwayValue::Coin(coin))
        } else {
            Ok(ConwayValue::Multiasset(coin, assets.into_iter().collect()))
        }
    }

    /// Serialized length of the value; what the per-output size ceiling is
    /// measured against.
    pub fn size(&self) -> Result<usize, TxBuilderError> {
        Ok(self
            .build_conway()?
            .encode_fragment()
            .expect("failed to encode value fragment")
            .len())
    }
}

/// Strict domination: `a < b` only when `a.coin < b.coin` *and* every asset
/// quantity in `a` sits strictly below its counterpart in `b`. Values that
/// are neither equal nor dominated either way are incomparable.
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else if self.coin < other.coin && self.multi_asset.strictly_below(&other.multi_asset) {
            Some(Ordering::Less)
        } else if other.coin < self.coin && other.multi_asset.strictly_below(&self.multi_asset) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

impl AddAssign for Value {
    fn add_assign(&mut self, rhs: Value) {
        self.coin += rhs.coin;
        self.multi_asset += rhs.multi_asset;
    }
}

impl SubAssign for Value {
    fn sub_assign(&mut self, rhs: Value) {
        self.coin -= rhs.coin;
        self.multi_asset -= rhs.multi_asset;
    }
}

impl Add for Value {
    type Output = Value;

    fn add(mut self, rhs: Value) -> Value {
        self += rhs;
        self
    }
}

impl Sub for Value {
    type Output = Value;

    fn sub(mut self, rhs: Value) -> Value {
        self -= rhs;
        self
    }
}
