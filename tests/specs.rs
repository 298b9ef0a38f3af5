//! End-to-end specs that drive the built binary as a subprocess, the way
//! the source system's own `tests/specs.rs` drives its CSV pipeline.
//!
//! `role=none` only loads the config and validates region/routing data
//! before exiting (it needs no live Redis or routing engine), so it is the
//! one role this crate can exercise start-to-finish without a network
//! fixture — the same "load, validate, exit" path a CI pipeline runs.

use cli_test_dir::*;

const POLY_FILE: &str = "\
podlaskie
1
 23.0 53.0
 23.0 54.0
 24.0 54.0
 24.0 53.0
 23.0 53.0
END
END
";

const ADDRESS_BOOK_CSV: &str = "\
1;23.5;53.5;PL;Bialystok;15-001;Wiejska;35a
";

fn config_json(region_name: &str) -> String {
    format!(
        r#"{{
  "rpc": {{
    "address": "127.0.0.1",
    "port": 8080,
    "auth": [
      {{
        "type": "jwt+hs256",
        "name": "test-idp",
        "issuer": "trasa",
        "audience": "trasa-core",
        "keys": {{ "k1": "shh" }}
      }}
    ]
  }},
  "aws": {{
    "tables": {{ "trips": "trips", "accounts": "accounts" }},
    "queues": {{ "pending_routes": "pending_routes" }},
    "redis_url": "redis://localhost:6379"
  }},
  "geocoder": {{ "mode": "radix" }},
  "routing": {{
    "algorithm": "ch",
    "max_waypoints": 25,
    "async_threshold": 8,
    "worker_concurrency": 4,
    "engine_base_url": "http://localhost:5000"
  }},
  "regions": [
    {{
      "name": "{region_name}",
      "addressbook": {{ "radix": "addressbook.csv" }},
      "poly": "region.poly"
    }}
  ]
}}
"#
    )
}

#[test]
fn role_none_validates_a_well_formed_config() {
    let testdir = TestDir::new("trasa-core", "role_none_validates_a_well_formed_config");
    testdir.create_file("region.poly", POLY_FILE);
    testdir.create_file("addressbook.csv", ADDRESS_BOOK_CSV);
    testdir.create_file("config.json", config_json("podlaskie"));

    testdir
        .cmd()
        .arg("config.json")
        .arg("none")
        .output_with_stdin("")
        .expect_success();
}

#[test]
fn role_none_fails_fast_on_a_poly_file_missing_the_named_region() {
    let testdir = TestDir::new("trasa-core", "role_none_fails_fast_on_a_poly_file_missing_the_named_region");
    testdir.create_file("region.poly", POLY_FILE);
    testdir.create_file("addressbook.csv", ADDRESS_BOOK_CSV);
    testdir.create_file("config.json", config_json("mazowieckie"));

    let output = testdir.cmd().arg("config.json").arg("none").output_with_stdin("");
    assert!(!output.status.success());
}
