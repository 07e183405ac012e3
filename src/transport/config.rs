use super::{ConnectOptions, Engine};

pub fn parse_engine(s: &str) -> Option<Engine> {
    match s.to_lowercase().as_str() {
        "amqp" | "rabbitmq" => Some(Engine::Amqp),
        #[cfg(any(test, feature = "transport-mock"))]
        "mock" => Some(Engine::Mock),
        _ => None,
    }
}

pub fn parse_connect_kv(pairs: &[String]) -> ConnectOptions {
    let mut opts = ConnectOptions::default();
    for p in pairs {
        if let Some((k, v)) = p.split_once('=') {
            opts.params.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    opts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_names_are_case_insensitive() {
        assert_eq!(parse_engine("AMQP"), Some(Engine::Amqp));
        assert_eq!(parse_engine("rabbitmq"), Some(Engine::Amqp));
        assert_eq!(parse_engine("mock"), Some(Engine::Mock));
        assert_eq!(parse_engine("zenoh"), None);
    }

    #[test]
    fn connect_pairs_skip_malformed_entries() {
        let opts = parse_connect_kv(&[
            "host=broker.local".to_string(),
            "port = 5673".to_string(),
            "garbage".to_string(),
        ]);
        assert_eq!(opts.params.len(), 2);
        assert_eq!(opts.params["host"], "broker.local");
        assert_eq!(opts.params["port"], "5673");
    }
}
