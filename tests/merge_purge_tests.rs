use anyhow::Result;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use flatsift::keys::{column_extractor, pad_key_with_zero};
use flatsift::merge_purge::merge_purge_async;
use flatsift::{
    ErrorKind, ExternalSortProcessor, FileSource, KeyDefinition, KeyDefinitionSet, KeyType,
    MergePurgeAction, MergePurgeEngine, MergePurgeMode, MergePurgeParam, SortConfig,
    SortDirection, SortError, SortPhase,
};

const MASTER: &str = "id,name\n3,carol\n1,alice\n2,bob\n";

/// Helper function to create a master and detail file in the temp directory
fn create_test_files(temp_dir: &TempDir, master: &str, detail: &str) -> Result<(PathBuf, PathBuf)> {
    let master_path = temp_dir.path().join("master.csv");
    let detail_path = temp_dir.path().join("detail.csv");
    fs::write(&master_path, master)?;
    fs::write(&detail_path, detail)?;
    Ok((master_path, detail_path))
}

fn master_processor(path: &Path) -> Result<ExternalSortProcessor<'static>> {
    Ok(ExternalSortProcessor::new(
        SortConfig::default(),
        FileSource::delimited(path, ','),
        KeyDefinitionSet::single(KeyDefinition::numeric(SortDirection::Ascending).unique()),
        column_extractor(vec![(0, KeyType::Numeric)]),
    )?)
}

/// Classifies by the action name in the detail's third column. Adds and
/// updates carry the first two detail fields as the master record.
fn action_column(param: &mut MergePurgeParam) -> flatsift::Result<()> {
    param.action = match param.detail_fields[2].as_str() {
        "add" => MergePurgeAction::Add,
        "update" => MergePurgeAction::Update,
        "delete" => MergePurgeAction::Delete,
        _ => MergePurgeAction::Ignore,
    };
    if matches!(param.action, MergePurgeAction::Add | MergePurgeAction::Update) {
        param.master_fields = Some(param.detail_fields[..2].to_vec());
    }
    Ok(())
}

fn engine<'a>(master: &Path, detail: &Path) -> Result<MergePurgeEngine<'a>> {
    Ok(MergePurgeEngine::new(
        master_processor(master)?,
        FileSource::delimited(detail, ','),
        column_extractor(vec![(0, KeyType::Numeric)]),
        action_column,
    )?)
}

#[test]
fn test_passive_categorises_each_detail_line() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let detail = "id,name,action\n2,bobby,update\n42,zed,add\n1,alice,keep\n3,carol,delete\n";
    let (master_path, detail_path) = create_test_files(&temp_dir, MASTER, detail)?;

    let result = engine(&master_path, &detail_path)?.run()?;

    assert_eq!(result.mode, MergePurgeMode::Passive);
    assert_eq!(result.detail_lines_read, 4);
    assert_eq!(result.matches, 3);
    assert_eq!((result.adds, result.updates, result.deletes, result.ignored), (1, 1, 1, 1));
    assert_eq!(result.master.lines_read, 3);

    let expect = [
        (MergePurgeAction::Add, "42,zed,add"),
        (MergePurgeAction::Update, "2,bobby,update"),
        (MergePurgeAction::Delete, "3,carol,delete"),
        (MergePurgeAction::Ignore, "1,alice,keep"),
    ];
    for (action, line) in expect {
        let path = result.path_for(action).expect("category file kept");
        assert_eq!(
            fs::read_to_string(path)?,
            format!("id,name,action\n{}\n", line)
        );
    }

    // passive mode leaves the master data untouched
    assert_eq!(fs::read_to_string(&master_path)?, MASTER);
    let new_master = fs::read_to_string(result.new_master_path.unwrap())?;
    assert_eq!(new_master, "id,name\n1,alice\n2,bob\n3,carol\n");
    assert_eq!(result.new_master_records, 3);
    Ok(())
}

#[test]
fn test_passive_removes_empty_categories() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let detail = "id,name,action\n7,gus,add\n8,hal,add\n";
    let (master_path, detail_path) = create_test_files(&temp_dir, MASTER, detail)?;

    let result = engine(&master_path, &detail_path)?.run()?;

    assert_eq!(result.adds, 2);
    assert_eq!(result.matches, 0);
    assert!(result.adds_path.is_some());
    assert!(result.updates_path.is_none());
    assert!(result.deletes_path.is_none());
    assert!(result.ignored_path.is_none());
    assert!(!temp_dir.path().join("detail_updates.csv").exists());
    assert!(!temp_dir.path().join("detail_deletes.csv").exists());
    assert!(!temp_dir.path().join("detail_ignored.csv").exists());
    assert!(temp_dir.path().join("detail_adds.csv").exists());
    Ok(())
}

#[test]
fn test_active_applies_changes_to_new_master() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let detail =
        "id,name,action\n2,bobby,update\n0,zara,add\n3,carol,delete\n5,eve,add\n9,nobody,delete\n";
    let (master_path, detail_path) = create_test_files(&temp_dir, MASTER, detail)?;

    let result = engine(&master_path, &detail_path)?
        .with_mode(MergePurgeMode::Active)
        .run()?;

    assert_eq!(result.mode, MergePurgeMode::Active);
    assert_eq!(result.adds, 2);
    assert_eq!(result.updates, 1);
    assert_eq!(result.deletes, 1);
    // delete of a key that is not in the master is not honoured
    assert_eq!(result.ignored, 1);
    assert_eq!(result.mismatched, 1);
    assert_eq!(result.new_master_records, 3 + result.adds - result.deletes);

    // no category files in active mode
    for action in [
        MergePurgeAction::Add,
        MergePurgeAction::Update,
        MergePurgeAction::Delete,
        MergePurgeAction::Ignore,
    ] {
        assert!(result.path_for(action).is_none());
    }
    assert!(!temp_dir.path().join("detail_adds.csv").exists());

    let new_master = fs::read_to_string(result.new_master_path.unwrap())?;
    assert_eq!(new_master, "id,name\n0,zara\n1,alice\n2,bobby\n5,eve\n");
    Ok(())
}

#[test]
fn test_add_request_for_existing_key_is_ignored() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let detail = "id,name,action\n1,again,add\n";
    let (master_path, detail_path) = create_test_files(&temp_dir, MASTER, detail)?;

    let result = engine(&master_path, &detail_path)?
        .with_mode(MergePurgeMode::Active)
        .run()?;

    assert_eq!(result.adds, 0);
    assert_eq!(result.ignored, 1);
    assert_eq!(result.mismatched, 1);
    assert_eq!(result.new_master_records, 3);
    Ok(())
}

#[test]
fn test_classifier_sees_master_fields() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let detail = "id,name,action\n2,x,keep\n11,y,keep\n";
    let (master_path, detail_path) = create_test_files(&temp_dir, MASTER, detail)?;
    let seen = RefCell::new(Vec::new());

    MergePurgeEngine::new(
        master_processor(&master_path)?,
        FileSource::delimited(&detail_path, ','),
        column_extractor(vec![(0, KeyType::Numeric)]),
        |param: &mut MergePurgeParam| {
            seen.borrow_mut()
                .push((param.key_found, param.master_fields.clone()));
            Ok(())
        },
    )?
    .run()?;

    let seen = seen.into_inner();
    assert_eq!(
        seen,
        vec![
            (true, Some(vec!["2".to_string(), "bob".to_string()])),
            (false, None),
        ]
    );
    Ok(())
}

#[test]
fn test_progress_covers_load_reconcile_and_write() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let detail = "id,name,action\n1,a,keep\n";
    let (master_path, detail_path) = create_test_files(&temp_dir, MASTER, detail)?;
    let mut phases = Vec::new();

    engine(&master_path, &detail_path)?
        .with_progress(|p| phases.push((p.phase, p.counter)))
        .run()?;

    assert_eq!(
        phases,
        vec![
            (SortPhase::Reading, 1),
            (SortPhase::Reading, 2),
            (SortPhase::Reading, 3),
            (SortPhase::Reading, 1),
            (SortPhase::Writing, 1),
            (SortPhase::Writing, 2),
            (SortPhase::Writing, 3),
        ]
    );
    Ok(())
}

#[test]
fn test_classifier_failure_removes_outputs() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let detail = "id,name,action\n1,a,keep\n2,b,boom\n";
    let (master_path, detail_path) = create_test_files(&temp_dir, MASTER, detail)?;

    let err = MergePurgeEngine::new(
        master_processor(&master_path)?,
        FileSource::delimited(&detail_path, ','),
        column_extractor(vec![(0, KeyType::Numeric)]),
        |param: &mut MergePurgeParam| {
            if param.detail_fields[2] == "boom" {
                return Err(SortError::aborted("classifier gave up"));
            }
            Ok(())
        },
    )?
    .run()
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Callback);
    for name in [
        "detail_adds.csv",
        "detail_updates.csv",
        "detail_deletes.csv",
        "detail_ignored.csv",
        "master_master.csv",
    ] {
        assert!(!temp_dir.path().join(name).exists(), "{} left behind", name);
    }
    // only the inputs remain, the staging directory is gone too
    assert_eq!(fs::read_dir(temp_dir.path())?.count(), 2);
    Ok(())
}

#[test]
fn test_detail_key_of_wrong_type_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let detail = "id,name,action\n1,a,keep\n";
    let (master_path, detail_path) = create_test_files(&temp_dir, MASTER, detail)?;

    let err = MergePurgeEngine::new(
        master_processor(&master_path)?,
        FileSource::delimited(&detail_path, ','),
        column_extractor(vec![(0, KeyType::Text)]),
        action_column,
    )?
    .run()
    .unwrap_err();

    assert!(matches!(err, SortError::KeyMismatch { line_number: 2, .. }));
    Ok(())
}

#[test]
fn test_active_run_clears_category_files_of_earlier_passive_run() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let detail = "id,name,action\n2,bobby,update\n42,zed,add\n1,alice,keep\n3,carol,delete\n";
    let (master_path, detail_path) = create_test_files(&temp_dir, MASTER, detail)?;
    let category_files = [
        "detail_adds.csv",
        "detail_updates.csv",
        "detail_deletes.csv",
        "detail_ignored.csv",
    ];

    engine(&master_path, &detail_path)?.run()?;
    for name in category_files {
        assert!(temp_dir.path().join(name).exists());
    }

    let result = engine(&master_path, &detail_path)?
        .with_mode(MergePurgeMode::Active)
        .run()?;

    assert!(result.adds_path.is_none());
    for name in category_files {
        assert!(!temp_dir.path().join(name).exists(), "{} left behind", name);
    }
    let new_master = fs::read_to_string(result.new_master_path.unwrap())?;
    assert_eq!(new_master, "id,name\n1,alice\n2,bobby\n42,zed\n");
    Ok(())
}

#[test]
fn test_active_fixed_width_master_keeps_trailing_spaces() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let master_path = temp_dir.path().join("master.dat");
    let detail_path = temp_dir.path().join("detail.csv");
    fs::write(&master_path, "00003carol   \n00001alice   \n")?;
    fs::write(&detail_path, "id,name,action\n1,alicia,update\n2,bob,add\n")?;

    let master = ExternalSortProcessor::new(
        SortConfig::default(),
        FileSource::fixed_width(&master_path, vec![5, 8]).with_header(false),
        KeyDefinitionSet::single(KeyDefinition::numeric(SortDirection::Ascending).unique()),
        column_extractor(vec![(0, KeyType::Numeric)]),
    )?;
    let result = MergePurgeEngine::new(
        master,
        FileSource::delimited(&detail_path, ','),
        column_extractor(vec![(0, KeyType::Numeric)]),
        |param: &mut MergePurgeParam| {
            action_column(param)?;
            if let Some(fields) = param.master_fields.as_mut() {
                fields[0] = pad_key_with_zero(&fields[0], 5);
            }
            Ok(())
        },
    )?
    .with_mode(MergePurgeMode::Active)
    .run()?;

    assert_eq!((result.adds, result.updates), (1, 1));
    let new_master_path = result.new_master_path.unwrap();
    assert_eq!(new_master_path, temp_dir.path().join("master_master.dat"));
    assert_eq!(
        fs::read_to_string(new_master_path)?,
        "00001alicia  \n00002bob     \n00003carol   \n"
    );
    Ok(())
}

#[tokio::test]
async fn test_async_merge_purge() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let detail = "id,name,action\n4,dan,add\n";
    let (master_path, detail_path) = create_test_files(&temp_dir, MASTER, detail)?;

    let result = merge_purge_async(move || {
        let processor = ExternalSortProcessor::new(
            SortConfig::default(),
            FileSource::delimited(&master_path, ','),
            KeyDefinitionSet::single(KeyDefinition::numeric(SortDirection::Ascending)),
            column_extractor(vec![(0, KeyType::Numeric)]),
        )?;
        Ok(MergePurgeEngine::new(
            processor,
            FileSource::delimited(&detail_path, ','),
            column_extractor(vec![(0, KeyType::Numeric)]),
            action_column,
        )?
        .with_mode(MergePurgeMode::Active))
    })
    .await?;

    assert_eq!(result.adds, 1);
    let new_master = fs::read_to_string(result.new_master_path.unwrap())?;
    assert_eq!(new_master, "id,name\n1,alice\n2,bob\n3,carol\n4,dan\n");
    Ok(())
}
