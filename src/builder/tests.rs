use std::collections::HashMap;

use num::BigRational;
use pallas::crypto::hash::Hasher;
use pallas::crypto::key::ed25519::SecretKey;
use pallas::ledger::addresses::{
    Address, Network, ShelleyAddress, ShelleyDelegationPart, ShelleyPaymentPart,
};
use pallas::ledger::primitives::conway::{
    ExUnits as PallasExUnits, NativeScript, PlutusData, Redeemer as PallasRedeemer,
    RedeemerTag, Redeemers as PallasRedeemers, ScriptData, Tx,
};
use pallas::ledger::primitives::{Fragment, KeepRaw, NonEmptySet};

use super::fee::{fee, max_tx_fee, min_lovelace};
use super::{TransactionBuilder, TxBuilderError};
use crate::context::{ChainContext, ProtocolParams};
use crate::primitives::{
    datum_hash, Asset, AssetName, ExUnits, Hash, Input, MultiAsset, Output, PolicyId, Redeemer,
    Script, ScriptKind, Utxo, Value,
};
use crate::selection::{LargestFirstSelector, RandomImproveMultiAsset, UtxoSelector};

const ADA: i64 = 1_000_000;

struct MockContext {
    params: ProtocolParams,
    utxos: HashMap<Vec<u8>, Vec<Utxo>>,
}

impl MockContext {
    fn new() -> Self {
        Self::with_params(ProtocolParams::mainnet())
    }

    fn with_params(params: ProtocolParams) -> Self {
        Self {
            params,
            utxos: HashMap::new(),
        }
    }

    fn put_utxos(&mut self, address: &Address, utxos: Vec<Utxo>) {
        self.utxos.insert(address.to_vec(), utxos);
    }
}

impl ChainContext for MockContext {
    fn protocol_param(&self) -> &ProtocolParams {
        &self.params
    }

    fn utxos(&self, address: &Address) -> anyhow::Result<Vec<Utxo>> {
        Ok(self.utxos.get(&address.to_vec()).cloned().unwrap_or_default())
    }
}

/// A context that must never be asked for UTxOs.
struct OfflineContext(ProtocolParams);

impl ChainContext for OfflineContext {
    fn protocol_param(&self) -> &ProtocolParams {
        &self.0
    }

    fn utxos(&self, _address: &Address) -> anyhow::Result<Vec<Utxo>> {
        panic!("selection must not run");
    }
}

struct FailingSelector;

impl UtxoSelector for FailingSelector {
    fn select(
        &self,
        _utxos: &[Utxo],
        _requested: &Value,
        _context: &dyn ChainContext,
    ) -> Result<(Vec<Utxo>, Value), TxBuilderError> {
        Err(TxBuilderError::UtxoSelection("primary always fails".into()))
    }
}

fn key_address(seed: u8) -> Address {
    Address::Shelley(ShelleyAddress::new(
        Network::Testnet,
        ShelleyPaymentPart::Key(Hash::from([seed; 28])),
        ShelleyDelegationPart::Null,
    ))
}

fn script_address(seed: u8) -> Address {
    Address::Shelley(ShelleyAddress::new(
        Network::Testnet,
        ShelleyPaymentPart::Script(Hash::from([seed; 28])),
        ShelleyDelegationPart::Null,
    ))
}

fn ada_utxo(tx_seed: u8, index: u64, address: &Address, lovelace: i64) -> Utxo {
    Utxo::new(
        Input::new(Hash::from([tx_seed; 32]), index),
        Output::new(address.clone(), Value::new(lovelace)),
    )
}

fn policy(seed: u8) -> PolicyId {
    Hash::from([seed; 28])
}

fn asset_name(index: usize) -> AssetName {
    format!("asset{index:03}").into_bytes().into()
}

/// `policies` policies carrying `per_policy` assets each, quantities kept
/// small so they encode in one byte.
fn wide_bundle(policies: u8, per_policy: usize) -> MultiAsset {
    let mut bundle = MultiAsset::default();
    for p in 0..policies {
        let assets: Asset = (0..per_policy)
            .map(|i| (asset_name(i), (i % 20 + 1) as i64))
            .collect();
        bundle += MultiAsset::from_single(policy(100 + p), assets);
    }
    bundle
}

fn decoded_input_refs(tx_bytes: &[u8]) -> Vec<([u8; 32], u64)> {
    let decoded = Tx::decode_fragment(tx_bytes).expect("could not decode tx");
    decoded
        .transaction_body
        .inputs
        .iter()
        .map(|input| (*input.transaction_id, input.index))
        .collect()
}

#[test]
fn ada_only_build_adds_change_and_charges_the_exact_fee() {
    let ctx = MockContext::new();
    let alice = key_address(1);
    let bob = key_address(2);

    let mut builder = TransactionBuilder::new(&ctx)
        .add_input(ada_utxo(9, 0, &alice, 10 * ADA))
        .add_output(Output::new(bob, Value::new(4 * ADA)), None, false);

    let tx = builder.build(Some(&alice)).expect("build failed");

    // One declared output plus one change output, all lovelace accounted
    // for.
    assert_eq!(builder.outputs.len(), 2);
    let total_out: i64 = builder.outputs.iter().map(|o| o.amount.coin).sum();
    assert_eq!(total_out + builder.fee as i64, 10 * ADA);

    // The placeholder witness sizes the transaction to the byte: signing
    // with one key lands on exactly the length the fee was computed for.
    let signing_key = SecretKey::from([7u8; 32]);
    let signed = tx.sign(&signing_key).expect("signing failed");
    assert_eq!(builder.fee, fee(&ctx.params, signed.bytes.len() as u64, 0, 0));
    assert!(signed.bytes.len() <= ctx.params.max_tx_size as usize);
}

#[test]
fn identical_declarations_build_byte_identical_transactions() {
    let mut ctx = MockContext::new();
    let alice = key_address(1);
    let bob = key_address(2);
    ctx.put_utxos(
        &alice,
        vec![
            ada_utxo(3, 0, &alice, 12 * ADA),
            ada_utxo(4, 1, &alice, 7 * ADA),
            ada_utxo(5, 0, &alice, 30 * ADA),
        ],
    );

    let build = |seed: u64| {
        let mut builder = TransactionBuilder::with_selectors(
            &ctx,
            vec![Box::new(RandomImproveMultiAsset::from_seed(seed))],
        )
        .add_input_address(alice.clone())
        .add_output(Output::new(bob.clone(), Value::new(5 * ADA)), None, false);
        builder.build(Some(&alice)).expect("build failed").bytes
    };

    assert_eq!(build(42), build(42));
}

#[test]
fn wide_change_splits_into_bounded_outputs() {
    let mut params = ProtocolParams::mainnet();
    params.max_val_size = 1_000;
    let ctx = MockContext::with_params(params);

    let alice = key_address(1);
    let bob = key_address(2);

    let bundle = wide_bundle(4, 25);
    let input = Utxo::new(
        Input::new(Hash::from([8u8; 32]), 0),
        Output::new(alice.clone(), Value::with_assets(100 * ADA, bundle.clone())),
    );

    let mut builder = TransactionBuilder::new(&ctx)
        .add_input(input)
        .add_output(Output::new(bob, Value::new(2 * ADA)), None, false);

    builder.build(Some(&alice)).expect("build failed");

    let change_outputs = &builder.outputs[1..];
    let asset_outputs: Vec<_> = change_outputs
        .iter()
        .filter(|o| !o.amount.multi_asset.is_empty())
        .collect();
    assert!(asset_outputs.len() >= 2, "change was not split");

    let mut reunited = MultiAsset::default();
    for output in change_outputs {
        assert!(output.amount.size().unwrap() <= 1_000);
        assert!(output.amount.coin >= min_lovelace(&output.amount, &ctx.params) as i64);
        for (policy, assets) in output.amount.multi_asset.iter() {
            for (name, quantity) in assets.iter() {
                assert!(*quantity > 0, "zero-quantity asset leaked into change");
                reunited += MultiAsset::from_single(
                    *policy,
                    Asset::from_iter([(name.clone(), *quantity)]),
                );
            }
        }
    }
    assert_eq!(reunited, bundle, "change buckets lost or invented assets");

    let total_out: i64 = builder.outputs.iter().map(|o| o.amount.coin).sum();
    assert_eq!(total_out + builder.fee as i64, 100 * ADA);
}

#[test]
fn script_input_indexes_its_redeemer_and_hashes_script_data() {
    let ctx = MockContext::new();
    let alice = key_address(1);
    let bob = key_address(2);

    let datum = vec![0x18, 0x2a];
    let locked = Utxo::new(
        Input::new(Hash::from([5u8; 32]), 1),
        Output::new(script_address(3), Value::new(7 * ADA)).with_datum_hash(datum_hash(&datum)),
    );
    let redeemer = Redeemer::new(RedeemerTag::Spend, vec![0x18, 0x2a], ExUnits::new(500, 500_000));
    let script = Script::new(ScriptKind::PlutusV2, vec![0x01, 0x02, 0x03]);

    let mut builder = TransactionBuilder::new(&ctx)
        .add_input(ada_utxo(1, 0, &alice, 10 * ADA))
        .add_script_input(locked, script, datum.clone(), redeemer)
        .expect("script input rejected")
        .add_output(Output::new(bob, Value::new(4 * ADA)), None, false);

    let tx = builder.build(Some(&alice)).expect("build failed");

    // The key input's tx id sorts before the script input's, so the
    // redeemer must point at position 1.
    assert_eq!(builder.redeemers[0].index, 1);

    let decoded = Tx::decode_fragment(&tx.bytes).expect("could not decode tx");
    let redeemers = decoded
        .transaction_witness_set
        .redeemer
        .as_ref()
        .expect("redeemers missing");
    let redeemers = match &**redeemers {
        PallasRedeemers::List(list) => list,
        other => panic!("unexpected redeemer shape: {other:?}"),
    };
    assert_eq!(redeemers.len(), 1);
    assert_eq!(redeemers[0].tag, RedeemerTag::Spend);
    assert_eq!(redeemers[0].index, 1);

    let plutus_datum = PlutusData::decode_fragment(&datum).unwrap();
    let expected = ScriptData {
        redeemers: Some(PallasRedeemers::List(vec![PallasRedeemer {
            tag: RedeemerTag::Spend,
            index: 1,
            data: plutus_datum.clone(),
            ex_units: PallasExUnits {
                mem: 500,
                steps: 500_000,
            },
        }])),
        datums: Some(KeepRaw::from(
            NonEmptySet::from_vec(vec![KeepRaw::from(plutus_datum)]).unwrap(),
        )),
        language_views: None,
    };
    assert_eq!(
        decoded.transaction_body.script_data_hash,
        Some(expected.hash())
    );

    // The execution budget is priced into the fee.
    let signing_key = SecretKey::from([7u8; 32]);
    let signed = tx.sign(&signing_key).expect("signing failed");
    assert_eq!(
        builder.fee,
        fee(&ctx.params, signed.bytes.len() as u64, 500_000, 500)
    );
}

#[test]
fn script_input_preconditions_are_enforced() {
    let ctx = MockContext::new();
    let alice = key_address(1);
    let datum = vec![0x18, 0x2a];

    // Key-locked utxo offered as a script input.
    let not_a_script = ada_utxo(2, 0, &alice, 5 * ADA);
    let err = TransactionBuilder::new(&ctx)
        .add_script_input(
            not_a_script,
            Script::new(ScriptKind::PlutusV2, vec![0x01]),
            datum.clone(),
            Redeemer::new(RedeemerTag::Spend, datum.clone(), ExUnits::default()),
        )
        .unwrap_err();
    assert!(matches!(err, TxBuilderError::InvalidArgument(_)));

    // Datum that does not hash to what the output committed to.
    let locked = Utxo::new(
        Input::new(Hash::from([5u8; 32]), 0),
        Output::new(script_address(3), Value::new(5 * ADA))
            .with_datum_hash(datum_hash(&[0x18, 0x2b])),
    );
    let err = TransactionBuilder::new(&ctx)
        .add_script_input(
            locked,
            Script::new(ScriptKind::PlutusV2, vec![0x01]),
            datum.clone(),
            Redeemer::new(RedeemerTag::Spend, datum, ExUnits::default()),
        )
        .unwrap_err();
    assert!(matches!(err, TxBuilderError::InvalidArgument(_)));
}

#[test]
fn failed_primary_selector_falls_through_to_the_next() {
    let mut ctx = MockContext::new();
    let alice = key_address(1);
    let bob = key_address(2);
    ctx.put_utxos(&alice, vec![ada_utxo(6, 0, &alice, 20 * ADA)]);

    let mut builder = TransactionBuilder::with_selectors(
        &ctx,
        vec![Box::new(FailingSelector), Box::new(LargestFirstSelector)],
    )
    .add_input_address(alice.clone())
    .add_output(Output::new(bob, Value::new(3 * ADA)), None, false);

    builder.build(Some(&alice)).expect("fallback should cover the request");
    assert_eq!(builder.inputs.len(), 1);
}

#[test]
fn all_selectors_failing_surfaces_a_selection_error() {
    let mut ctx = MockContext::new();
    let alice = key_address(1);
    let bob = key_address(2);
    // Far too little at the source address.
    ctx.put_utxos(&alice, vec![ada_utxo(6, 0, &alice, ADA)]);

    let mut builder = TransactionBuilder::new(&ctx)
        .add_input_address(alice.clone())
        .add_output(Output::new(bob, Value::new(50 * ADA)), None, false);

    let err = builder.build(Some(&alice)).unwrap_err();
    assert!(matches!(err, TxBuilderError::UtxoSelection(_)));
    // No half-applied state: the declared output is all that is left.
    assert_eq!(builder.outputs.len(), 1);
    assert!(builder.inputs.is_empty());
    assert_eq!(builder.fee, 0);
}

#[test]
fn inputs_that_cannot_pay_the_fee_fail_and_roll_back() {
    let ctx = MockContext::new();
    let alice = key_address(1);
    let bob = key_address(2);

    // Enough for the output, not for output plus fee.
    let mut builder = TransactionBuilder::new(&ctx)
        .add_input(ada_utxo(2, 0, &alice, 5 * ADA + 100_000))
        .add_output(Output::new(bob, Value::new(5 * ADA)), None, false);

    let err = builder.build(Some(&alice)).unwrap_err();
    assert!(matches!(err, TxBuilderError::InvalidTransaction(_)));
    assert_eq!(builder.outputs.len(), 1);
    assert_eq!(builder.fee, 0);
}

#[test]
fn conflicting_input_and_exclusion_fail_before_any_lookup() {
    let ctx = OfflineContext(ProtocolParams::mainnet());
    let alice = key_address(1);
    let bob = key_address(2);

    let utxo = ada_utxo(2, 0, &alice, 10 * ADA);
    let mut builder = TransactionBuilder::new(&ctx)
        .add_input(utxo.clone())
        .exclude_input(utxo)
        .add_input_address(alice.clone())
        .add_output(Output::new(bob, Value::new(20 * ADA)), None, false);

    let err = builder.build(Some(&alice)).unwrap_err();
    assert!(matches!(err, TxBuilderError::Conflict(_)));
}

#[test]
fn excluded_utxos_never_enter_the_candidate_pool() {
    let mut ctx = MockContext::new();
    let alice = key_address(1);
    let bob = key_address(2);

    let fat = ada_utxo(7, 0, &alice, 50 * ADA);
    let thin = ada_utxo(8, 0, &alice, 20 * ADA);
    ctx.put_utxos(&alice, vec![fat.clone(), thin.clone()]);

    let mut builder =
        TransactionBuilder::with_selectors(&ctx, vec![Box::new(LargestFirstSelector)])
            .add_input_address(alice.clone())
            .exclude_input(fat.clone())
            .add_output(Output::new(bob, Value::new(3 * ADA)), None, false);

    builder.build(Some(&alice)).expect("build failed");

    assert!(builder.inputs.contains(&thin));
    assert!(!builder.inputs.contains(&fat));
}

#[test]
fn inputs_end_up_in_canonical_order() {
    let ctx = MockContext::new();
    let alice = key_address(1);
    let bob = key_address(2);

    let mut builder = TransactionBuilder::new(&ctx)
        .add_input(ada_utxo(3, 1, &alice, 4 * ADA))
        .add_input(ada_utxo(1, 0, &alice, 4 * ADA))
        .add_input(ada_utxo(3, 0, &alice, 4 * ADA))
        .add_input(ada_utxo(2, 7, &alice, 4 * ADA))
        .add_output(Output::new(bob, Value::new(9 * ADA)), None, false);

    let tx = builder.build(Some(&alice)).expect("build failed");

    let refs = decoded_input_refs(&tx.bytes);
    assert_eq!(refs.len(), 4);
    assert!(refs.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn minted_assets_balance_against_outputs_and_change() {
    let ctx = MockContext::new();
    let alice = key_address(1);
    let bob = key_address(2);

    let minted = MultiAsset::from_single(
        policy(9),
        Asset::from_iter([(b"crown".to_vec().into(), 5i64)]),
    );
    let sent = MultiAsset::from_single(
        policy(9),
        Asset::from_iter([(b"crown".to_vec().into(), 3i64)]),
    );

    let mut builder = TransactionBuilder::new(&ctx)
        .add_input(ada_utxo(4, 0, &alice, 20 * ADA))
        .mint(minted.clone())
        .native_scripts(vec![NativeScript::ScriptPubkey(Hash::from([9u8; 28]))])
        .add_output(
            Output::new(bob, Value::with_assets(2 * ADA, sent)),
            None,
            false,
        );

    builder.build(Some(&alice)).expect("build failed");

    // What was minted but not sent comes back as change.
    let mut change_assets = MultiAsset::default();
    for output in &builder.outputs[1..] {
        change_assets += output.amount.multi_asset.clone();
    }
    assert_eq!(
        change_assets.quantity(&policy(9), &b"crown".to_vec().into()),
        2
    );

    let mut consumed = Value::new(builder.fee as i64);
    for output in &builder.outputs {
        consumed += output.amount.clone();
    }
    let mut provided = Value::default();
    for utxo in &builder.inputs {
        provided += utxo.output.amount.clone();
    }
    provided.multi_asset += minted;
    assert_eq!(consumed.coin, provided.coin);
    assert_eq!(
        consumed.multi_asset.filter(|_, _, q| q != 0),
        provided.multi_asset.filter(|_, _, q| q != 0)
    );
}

#[test]
fn change_cannot_fund_its_buckets_deposits() {
    let mut params = ProtocolParams::mainnet();
    params.max_val_size = 1_000;
    params.price_mem = BigRational::from_integer(0.into());
    params.price_step = BigRational::from_integer(0.into());
    let ctx = MockContext::with_params(params);

    let alice = key_address(1);
    let bob = key_address(2);
    let bundle = wide_bundle(4, 25);

    // Learn the bucket layout first: the input funds every non-final
    // deposit exactly, so after the worst-case fee shrinks to the real
    // one, the last bucket still cannot meet its own deposit.
    let layout = TransactionBuilder::new(&ctx)
        .pack_tokens_for_change(&Value::with_assets(0, bundle.clone()), 1_000)
        .unwrap();
    assert!(layout.len() >= 2);
    let non_final: i64 = layout[..layout.len() - 1]
        .iter()
        .map(|bucket| min_lovelace(&Value::with_assets(0, bucket.clone()), &ctx.params) as i64)
        .sum();

    let input_coin = 2 * ADA + max_tx_fee(&ctx.params) as i64 + non_final;
    let input = Utxo::new(
        Input::new(Hash::from([8u8; 32]), 0),
        Output::new(alice.clone(), Value::with_assets(input_coin, bundle)),
    );

    let mut builder = TransactionBuilder::new(&ctx)
        .add_input(input)
        .add_output(Output::new(bob, Value::new(2 * ADA)), None, false);

    let err = builder.build(Some(&alice)).unwrap_err();
    assert!(matches!(err, TxBuilderError::InsufficientUtxoBalance(_)));
    assert_eq!(builder.outputs.len(), 1);
}

#[test]
fn no_change_address_leaves_the_surplus_to_the_fee_side() {
    let ctx = MockContext::new();
    let alice = key_address(1);
    let bob = key_address(2);

    let mut builder = TransactionBuilder::new(&ctx)
        .add_input(ada_utxo(2, 0, &alice, 10 * ADA))
        .add_output(Output::new(bob, Value::new(4 * ADA)), None, false);

    builder.build(None).expect("build failed");

    assert_eq!(builder.outputs.len(), 1);
    assert!(builder.fee > 0);
}

#[test]
fn output_datum_travels_by_hash_and_optionally_in_the_witness_set() {
    let ctx = MockContext::new();
    let alice = key_address(1);
    let datum = vec![0x18, 0x2a];

    let mut builder = TransactionBuilder::new(&ctx)
        .add_input(ada_utxo(2, 0, &alice, 10 * ADA))
        .add_output(
            Output::new(script_address(4), Value::new(3 * ADA)),
            Some(datum.clone()),
            true,
        );

    let tx = builder.build(Some(&alice)).expect("build failed");

    assert_eq!(builder.outputs[0].datum_hash, Some(datum_hash(&datum)));

    let decoded = Tx::decode_fragment(&tx.bytes).expect("could not decode tx");
    assert!(decoded.transaction_witness_set.plutus_data.is_some());
    // Witness datums without redeemers still pin the script data hash.
    assert!(decoded.transaction_body.script_data_hash.is_some());
}

#[test]
fn auxiliary_data_is_hashed_into_the_body() {
    let ctx = MockContext::new();
    let alice = key_address(1);
    let bob = key_address(2);

    // {20: 42}
    let aux = vec![0xa1, 0x14, 0x18, 0x2a];

    let mut builder = TransactionBuilder::new(&ctx)
        .add_input(ada_utxo(2, 0, &alice, 10 * ADA))
        .add_output(Output::new(bob, Value::new(4 * ADA)), None, false)
        .auxiliary_data(aux.clone())
        .expect("auxiliary data rejected");

    let tx = builder.build(Some(&alice)).expect("build failed");

    let decoded = Tx::decode_fragment(&tx.bytes).expect("could not decode tx");
    let hash = decoded
        .transaction_body
        .auxiliary_data_hash
        .as_ref()
        .expect("auxiliary data hash missing");
    assert_eq!(hash.to_vec(), Hasher::<256>::hash(&aux).to_vec());
}

#[test]
fn witness_set_carries_everything_but_signatures() {
    let ctx = MockContext::new();
    let alice = key_address(1);
    let bob = key_address(2);

    let datum = vec![0x18, 0x2a];
    let locked = Utxo::new(
        Input::new(Hash::from([5u8; 32]), 0),
        Output::new(script_address(3), Value::new(7 * ADA)).with_datum_hash(datum_hash(&datum)),
    );

    let mut builder = TransactionBuilder::new(&ctx)
        .add_input(ada_utxo(1, 0, &alice, 10 * ADA))
        .add_script_input(
            locked,
            Script::new(ScriptKind::PlutusV2, vec![0x01, 0x02]),
            datum.clone(),
            Redeemer::new(RedeemerTag::Spend, datum, ExUnits::new(10, 10)),
        )
        .expect("script input rejected")
        .add_output(Output::new(bob, Value::new(4 * ADA)), None, false);

    builder.build(Some(&alice)).expect("build failed");

    let witness_set = builder.build_witness_set().expect("witness set failed");
    assert!(witness_set.vkeywitness.is_none());
    assert!(witness_set.plutus_v2_script.is_some());
    assert!(witness_set.plutus_data.is_some());
    assert!(witness_set.redeemer.is_some());
}

#[test]
fn signing_appends_verification_key_witnesses() {
    let ctx = MockContext::new();
    let alice = key_address(1);
    let bob = key_address(2);

    let mut builder = TransactionBuilder::new(&ctx)
        .add_input(ada_utxo(2, 0, &alice, 10 * ADA))
        .add_output(Output::new(bob, Value::new(4 * ADA)), None, false);

    let signing_key = SecretKey::from([7u8; 32]);
    let signed = builder
        .build_and_sign(&[signing_key], Some(&alice))
        .expect("build and sign failed");

    assert_eq!(signed.signatures.as_ref().map(|s| s.len()), Some(1));

    let decoded = Tx::decode_fragment(&signed.bytes).expect("could not decode tx");
    let witnesses = decoded
        .transaction_witness_set
        .vkeywitness
        .as_ref()
        .expect("vkey witnesses missing");
    assert_eq!(witnesses.iter().count(), 1);
}
