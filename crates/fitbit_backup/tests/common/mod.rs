#![allow(dead_code)]

use chrono::NaiveDate;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Command;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(["-c", "user.name=test", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("run git");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

/// A bare repository with one commit, standing in for the remote.
pub fn seeded_bare_repo(root: &Path) -> PathBuf {
    let bare = root.join("data.git");
    git(root, &["init", "--bare", "data.git"]);
    git(root, &["clone", bare.to_str().unwrap(), "seed"]);
    let seed = root.join("seed");
    std::fs::write(seed.join("README.md"), "health data\n").unwrap();
    git(&seed, &["add", "README.md"]);
    git(&seed, &["commit", "-m", "init"]);
    git(&seed, &["push", "origin", "HEAD"]);
    bare
}

/// Commit `contents` at `rel_path` in `bare` through a throwaway clone.
pub fn push_file(root: &Path, bare: &Path, rel_path: &str, contents: &str) {
    let work = tempfile::tempdir_in(root).unwrap();
    git(work.path(), &["clone", bare.to_str().unwrap(), "w"]);
    let checkout = work.path().join("w");
    let dest = checkout.join(rel_path);
    std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
    std::fs::write(&dest, contents).unwrap();
    git(&checkout, &["add", rel_path]);
    git(&checkout, &["commit", "-m", "seed dataset"]);
    git(&checkout, &["push", "origin", "HEAD"]);
}

pub fn commit_count(bare: &Path) -> usize {
    git(bare, &["rev-list", "--count", "HEAD"]).parse().unwrap()
}

/// Fitbit responses for one day. `None` answers like a day without data.
#[derive(Clone, Copy, Default)]
pub struct ApiDay {
    pub sleep: Option<(u32, u32, u32)>,
    pub steps: Option<u32>,
    pub body: Option<(f64, f64, f64)>,
    pub resting_hr: Option<u32>,
}

pub async fn mount_day(server: &MockServer, day: NaiveDate, data: ApiDay) {
    let (asleep, records, in_bed) = data.sleep.unwrap_or((0, 0, 0));
    Mock::given(method("GET"))
        .and(path(format!("/1.2/user/-/sleep/date/{day}.json")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sleep": [],
            "summary": {
                "totalMinutesAsleep": asleep,
                "totalSleepRecords": records,
                "totalTimeInBed": in_bed,
                "stages": {"deep": 0, "light": 0, "rem": 0, "wake": 0}
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/1/user/-/activities/steps/date/{day}/1d.json")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "activities-steps": [{"dateTime": day.to_string(), "value": data.steps.unwrap_or(0).to_string()}]
        })))
        .mount(server)
        .await;

    let (bmi, fat, weight) = data.body.unwrap_or((0.0, 0.0, 0.0));
    Mock::given(method("GET"))
        .and(path(format!("/1/user/-/body/date/{day}.json")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "body": {"bmi": bmi, "fat": fat, "weight": weight}
        })))
        .mount(server)
        .await;

    let mut value = json!({"customHeartRateZones": [], "heartRateZones": []});
    if let Some(hr) = data.resting_hr {
        value["restingHeartRate"] = json!(hr);
    }
    Mock::given(method("GET"))
        .and(path(format!("/1/user/-/activities/heart/date/{day}/1d.json")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "activities-heart": [{"dateTime": day.to_string(), "value": value}]
        })))
        .mount(server)
        .await;
}
