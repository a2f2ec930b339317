//! Integration tests for loading, saving and migrating module files.

mod common;

use cardbox::{
    AnswerKind, Card, Error, ImageFormat, MISSING_IMAGE, MODULE_FORMAT_VERSION, Module,
    Repository, StoreConfig,
};
use common::{Fixture, PNG, legacy_module_json};

#[test]
fn test_save_then_load_roundtrip() {
    let fixture = Fixture::new();
    let picture = fixture.write_outside("cell.png", PNG);

    let mut repo = fixture.open();
    let store = repo.store().clone();
    let module = repo.create_module("Biology").unwrap();
    module.add_card(Card::with_text("Powerhouse?", "Mitochondria", "Cells", ""));
    module.add_card(Card::with_image_file(&store, "Which organelle?", &picture, "", "Biology").unwrap());
    repo.create_module("Spanish Verbs")
        .unwrap()
        .add_card(Card::with_text("hablar", "to speak", "", ""));
    assert!(repo.save_all().is_complete());

    let reopened = fixture.open();
    assert_eq!(reopened.names(), vec!["Biology", "Spanish Verbs"]);
    assert!(fixture.data_dir().join("Spanish_Verbs.json").is_file());

    for name in repo.names() {
        let before = repo.get_by_name(name).unwrap();
        let after = reopened.get_by_name(name).unwrap();
        assert_eq!(before.len(), after.len());
        for (a, b) in before.cards().iter().zip(after.cards()) {
            assert_eq!(a.id(), b.id());
            assert_eq!(a.question(), b.question());
            assert_eq!(a.topic(), b.topic());
            assert_eq!(a.answer(), b.answer());
            assert_eq!(b.module_name(), name);
        }
    }

    let mut reopened = reopened;
    let store = reopened.store().clone();
    let card = reopened.get_mut_by_name("Biology").unwrap().card_mut(1).unwrap();
    let image = card.load_image(&store).unwrap();
    assert_eq!(image.bytes, PNG);
    assert_eq!(image.format, ImageFormat::Png);
}

#[test]
fn test_corrupt_file_does_not_abort_loading() {
    let fixture = Fixture::new();
    fixture.write_module_json("A.json", r#"{"format_version":3,"name":"A","cards":[]}"#);
    fixture.write_module_json("B.json", "{ this is not json");
    fixture.write_module_json("C.json", r#"{"format_version":3,"name":"C","cards":[]}"#);

    let mut repo = Repository::new(fixture.config());
    let report = repo.load_all();

    assert_eq!(report.loaded, vec!["A", "C"]);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].0.ends_with("B.json"));
    assert!(report.resaved.is_none());
    assert_eq!(repo.len(), 2);
}

#[test]
fn test_duplicate_module_files_keep_first() {
    let fixture = Fixture::new();
    fixture.write_module_json("a.json", r#"{"format_version":3,"name":"X","cards":[]}"#);
    fixture.write_module_json("b.json", r#"{"format_version":3,"name":"X","cards":[]}"#);

    let mut repo = Repository::new(fixture.config());
    let report = repo.load_all();
    assert_eq!(report.loaded, vec!["X"]);
    assert_eq!(report.failed.len(), 1);
}

#[test]
fn test_add_duplicate_leaves_repository_unchanged() {
    let fixture = Fixture::new();
    let mut repo = fixture.open();
    repo.create_module("Bio")
        .unwrap()
        .add_card(Card::with_text("q", "a", "", ""));
    repo.save_module("Bio").unwrap();
    let on_disk = std::fs::read_to_string(repo.module_path("Bio")).unwrap();

    let mut intruder = Module::new("Bio");
    intruder.add_card(Card::with_text("other", "card", "", ""));
    intruder.add_card(Card::with_text("and", "another", "", ""));

    let err = repo.add(intruder).unwrap_err();
    assert!(matches!(err, Error::DuplicateName(ref name) if name == "Bio"));
    assert_eq!(repo.len(), 1);
    assert_eq!(repo.get_by_name("Bio").unwrap().len(), 1);
    assert_eq!(std::fs::read_to_string(repo.module_path("Bio")).unwrap(), on_disk);
}

#[test]
fn test_legacy_file_outside_root_is_copied_not_moved() {
    let fixture = Fixture::new();
    let picture = fixture.write_outside("Desktop/cell.png", PNG);
    fixture.write_module_json("Biology.json", &legacy_module_json("Biology", &picture));

    let mut repo = Repository::new(fixture.config());
    let report = repo.load_all();
    assert_eq!(report.migration.relocated, 1);
    assert!(report.resaved.as_ref().is_some_and(|r| r.is_complete()));

    let module = repo.get_by_name("Biology").unwrap();
    let image = module.card(0).unwrap().image_ref().unwrap();
    assert!(image.is_current_form());
    assert!(image.stored_path().unwrap().starts_with("Biology/"));
    assert!(picture.exists());

    let json = fixture.read_module_json("Biology.json");
    assert_eq!(json["format_version"], MODULE_FORMAT_VERSION);
    assert_eq!(json["cards"][0]["answer_type"], "image");
    assert_eq!(json["cards"][0]["image_path"], image.stored_path().unwrap());
    assert_eq!(json["cards"][1]["module_name"], "Biology");
    assert_eq!(json["cards"][1]["topic"], "General");
    assert!(json["cards"][1]["id"].is_string());
}

#[test]
fn test_legacy_file_in_flat_root_is_moved() {
    let fixture = Fixture::new();
    let flat = fixture.write_asset("leaf.png", PNG);
    fixture.write_module_json("Botany.json", &legacy_module_json("Botany", &flat));

    let repo = fixture.open();
    assert!(!flat.exists());

    let card = repo.get_by_name("Botany").unwrap().card(0).unwrap();
    let path = card.image_ref().unwrap().stored_path().unwrap();
    assert!(path.starts_with("Botany/"));
    assert!(path.ends_with("_leaf.png"));
    assert!(repo.store().resolve(path).is_some());
}

#[test]
fn test_flat_image_path_is_promoted() {
    let fixture = Fixture::new();
    let flat = fixture.write_asset("map.png", PNG);
    fixture.write_module_json(
        "Geo.json",
        r#"{"name":"Geo","cards":[{"question":"Where?","answer_type":"image","image_path":"map.png"}]}"#,
    );

    let repo = fixture.open();
    assert!(!flat.exists());
    let store = repo.store();
    let card = repo.get_by_name("Geo").unwrap().card(0).unwrap();
    assert_eq!(card.migration_state(store), Some(cardbox::MigrationState::Current));
    assert_eq!(card.module_name(), "Geo");
}

#[test]
fn test_broken_legacy_reference_is_marked_missing() {
    let fixture = Fixture::new();
    let gone = fixture.dir.path().join("deleted").join("cell.png");
    fixture.write_module_json("Biology.json", &legacy_module_json("Biology", &gone));

    let mut repo = fixture.open();
    let store = repo.store().clone();
    let card = repo.get_mut_by_name("Biology").unwrap().card_mut(0).unwrap();

    assert_eq!(card.answer_kind(), AnswerKind::Image);
    assert_eq!(card.image_ref().unwrap().stored_path(), Some(MISSING_IMAGE));
    assert!(card.load_image(&store).is_none());

    let json = fixture.read_module_json("Biology.json");
    assert_eq!(json["cards"][0]["image_path"], MISSING_IMAGE);
}

#[test]
fn test_migration_runs_once() {
    let fixture = Fixture::new();
    let picture = fixture.write_outside("cell.png", PNG);
    fixture.write_module_json("Biology.json", &legacy_module_json("Biology", &picture));

    let mut repo = Repository::new(fixture.config());
    let first = repo.load_all();
    assert!(first.resaved.is_some());
    let snapshot = repo.get_by_name("Biology").unwrap().clone();
    let assets = repo.store().list_assets().unwrap();

    let second = repo.load_all();
    assert!(second.resaved.is_none());
    assert!(!second.migration.changed());
    assert_eq!(repo.get_by_name("Biology").unwrap(), &snapshot);
    assert_eq!(repo.store().list_assets().unwrap(), assets);

    assert!(!repo.migrate_all().changed());
}

#[test]
fn test_unversioned_text_module_is_rewritten() {
    let fixture = Fixture::new();
    fixture.write_module_json(
        "Spanish.json",
        r#"{"name":"Spanish","cards":[{"question":"hola","text_answer":"hello","module_name":"Spanish","id":"6c1b0c9e-3d2f-4a8e-9a57-0f6f0a1c2b3d"}]}"#,
    );

    let mut repo = Repository::new(fixture.config());
    let report = repo.load_all();
    assert!(!report.migration.changed());
    assert!(report.resaved.is_some());
    assert_eq!(fixture.read_module_json("Spanish.json")["format_version"], 3);
}

#[test]
fn test_topic_merge_persists() {
    let fixture = Fixture::new();
    let mut repo = fixture.open();
    let module = repo.create_module("Spanish").unwrap();
    module.add_card(Card::with_text("hola", "hello", "A", ""));
    module.add_card(Card::with_text("adiós", "bye", "A", ""));
    module.add_card(Card::with_text("gato", "cat", "B", ""));

    assert_eq!(module.merge_topic("A", "B").unwrap(), 2);
    assert!(!module.topics().contains("A"));
    repo.save_module("Spanish").unwrap();

    let reopened = fixture.open();
    let module = reopened.get_by_name("Spanish").unwrap();
    assert_eq!(module.topics().into_iter().collect::<Vec<_>>(), vec!["B"]);
    assert!(module.cards().iter().all(|c| c.topic() == "B"));
}

#[test]
fn test_remove_by_name_deletes_file() {
    let fixture = Fixture::new();
    let mut repo = fixture.open();
    repo.create_module("Temp").unwrap();
    let path = repo.module_path("Temp");
    assert!(path.is_file());

    let removed = repo.remove_by_name("Temp").unwrap();
    assert_eq!(removed.name(), "Temp");
    assert!(!path.exists());
    assert!(repo.get_by_name("Temp").is_none());
    assert!(matches!(repo.remove_by_name("Temp"), Err(Error::ModuleNotFound(_))));
}

#[test]
fn test_config_file_controls_layout() {
    let fixture = Fixture::new();
    let data_dir = fixture.dir.path().join("custom");
    let toml_path = fixture.dir.path().join("cardbox.toml");
    std::fs::write(
        &toml_path,
        format!(
            "data_dir = {:?}\nimages_dir = \"media\"\nmodule_extension = \"cards\"\n",
            data_dir.to_string_lossy()
        ),
    )
    .unwrap();

    let config = StoreConfig::from_file(&toml_path).unwrap();
    let mut repo = Repository::open(config).unwrap();
    assert!(data_dir.join("media").is_dir());
    assert!(data_dir.join("README.txt").is_file());

    repo.create_module("Bio").unwrap();
    assert!(data_dir.join("Bio.cards").is_file());

    let reopened = Repository::open(StoreConfig::from_file(&toml_path).unwrap()).unwrap();
    assert_eq!(reopened.names(), vec!["Bio"]);
}

#[test]
fn test_save_moves_module_off_a_stray_file() {
    let fixture = Fixture::new();
    let stray = fixture.write_module_json(
        "Bio copy.json",
        r#"{"format_version":3,"name":"Bio","cards":[]}"#,
    );

    let mut repo = fixture.open();
    assert!(stray.exists());
    repo.get_mut_by_name("Bio")
        .unwrap()
        .add_card(Card::with_text("q", "a", "", ""));
    let saved = repo.save_module("Bio").unwrap();

    assert_eq!(saved, fixture.data_dir().join("Bio.json"));
    assert!(!stray.exists());

    let mut reopened = Repository::new(fixture.config());
    let report = reopened.load_all();
    assert!(report.failed.is_empty());
    assert_eq!(reopened.get_by_name("Bio").unwrap().len(), 1);
}

#[test]
fn test_unversioned_stray_file_is_moved_on_load() {
    let fixture = Fixture::new();
    let stray = fixture.write_module_json("Bio copy.json", r#"{"name":"Bio","cards":[]}"#);

    let repo = fixture.open();
    assert!(!stray.exists());
    assert!(repo.module_path("Bio").is_file());
}

#[test]
fn test_remove_deletes_stray_source_file() {
    let fixture = Fixture::new();
    let stray = fixture.write_module_json(
        "Bio copy.json",
        r#"{"format_version":3,"name":"Bio","cards":[]}"#,
    );

    let mut repo = fixture.open();
    repo.remove_by_name("Bio").unwrap();
    assert!(!stray.exists());

    let reopened = fixture.open();
    assert!(reopened.is_empty());
}

#[test]
fn test_swapped_file_names_do_not_clobber() {
    let fixture = Fixture::new();
    fixture.write_module_json("X.json", r#"{"name":"Y","cards":[{"question":"y","text_answer":"y"}]}"#);
    fixture.write_module_json("Y.json", r#"{"name":"X","cards":[{"question":"x","text_answer":"x"}]}"#);

    fixture.open();

    let reopened = fixture.open();
    assert_eq!(reopened.names(), vec!["X", "Y"]);
    assert_eq!(reopened.get_by_name("X").unwrap().card(0).unwrap().question(), "x");
    assert_eq!(reopened.get_by_name("Y").unwrap().card(0).unwrap().question(), "y");
}

#[test]
fn test_save_all_continues_past_a_failed_module() {
    let fixture = Fixture::new();
    let mut repo = fixture.open();
    repo.create_module("A").unwrap();
    repo.create_module("B").unwrap();

    // A directory in place of the file makes the final rename fail.
    let blocked = repo.module_path("A");
    std::fs::remove_file(&blocked).unwrap();
    std::fs::create_dir(&blocked).unwrap();
    repo.get_mut_by_name("B")
        .unwrap()
        .add_card(Card::with_text("q", "a", "", ""));

    let report = repo.save_all();
    assert!(!report.is_complete());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "A");
    assert_eq!(report.saved, vec![repo.module_path("B")]);
    assert!(!fixture.data_dir().join("A.json.tmp").exists());

    let json = fixture.read_module_json("B.json");
    assert_eq!(json["cards"].as_array().unwrap().len(), 1);
}

#[test]
fn test_failed_delete_still_unloads() {
    let fixture = Fixture::new();
    let mut repo = fixture.open();
    repo.create_module("Temp").unwrap();

    let path = repo.module_path("Temp");
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    let err = repo.remove_by_name("Temp").unwrap_err();
    assert!(matches!(err, Error::Deletion { .. }));
    assert!(repo.get_by_name("Temp").is_none());
    assert!(repo.is_empty());
}
