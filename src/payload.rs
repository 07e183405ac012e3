use bytes::Bytes;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of `propN` draws per message.
pub const PROP_DRAWS: usize = 3;
/// Draws pick `N` from `0..PROP_KEYS`.
pub const PROP_KEYS: u32 = 4;
/// Property values are drawn from `0..PROP_VALUE_BOUND`.
pub const PROP_VALUE_BOUND: u32 = 100;

/// Synthetic JSON body: `{"foo":"bar","prop1":42,...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticPayload {
    pub foo: String,
    #[serde(flatten)]
    pub props: BTreeMap<String, u32>,
}

impl SyntheticPayload {
    pub fn encode(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// Draw `PROP_DRAWS` random `propN` keys; a repeated key keeps the last value.
pub fn generate_props<R: Rng + ?Sized>(rng: &mut R) -> BTreeMap<String, u32> {
    let mut props = BTreeMap::new();
    for _ in 0..PROP_DRAWS {
        let key = format!("prop{}", rng.gen_range(0..PROP_KEYS));
        props.insert(key, rng.gen_range(0..PROP_VALUE_BOUND));
    }
    props
}

pub fn generate_payload<R: Rng + ?Sized>(rng: &mut R) -> SyntheticPayload {
    SyntheticPayload {
        foo: "bar".to_string(),
        props: generate_props(rng),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::Value;

    #[test]
    fn payload_shape_holds_across_draws() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let bytes = generate_payload(&mut rng).encode().unwrap();
            let value: Value = serde_json::from_slice(&bytes).unwrap();
            let obj = value.as_object().unwrap();
            assert_eq!(obj["foo"], "bar");
            let props: Vec<_> = obj.iter().filter(|(k, _)| *k != "foo").collect();
            assert!((1..=PROP_DRAWS).contains(&props.len()));
            for (k, v) in props {
                let n: u32 = k.strip_prefix("prop").unwrap().parse().unwrap();
                assert!(n < PROP_KEYS);
                assert!(v.as_u64().unwrap() < PROP_VALUE_BOUND as u64);
            }
        }
    }

    #[test]
    fn foo_is_serialized_first() {
        let payload = SyntheticPayload {
            foo: "bar".into(),
            props: BTreeMap::from([("prop2".to_string(), 5), ("prop0".to_string(), 9)]),
        };
        let text = String::from_utf8(payload.encode().unwrap().to_vec()).unwrap();
        assert_eq!(text, r#"{"foo":"bar","prop0":9,"prop2":5}"#);
    }

    #[test]
    fn same_seed_same_payload() {
        let a = generate_payload(&mut StdRng::seed_from_u64(42));
        let b = generate_payload(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }
}
