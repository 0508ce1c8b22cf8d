use std::collections::BTreeMap;

use super::model::{BiasRecord, MarkRecord, RecordStore, ScoreRecord};

pub const MUNICIPALITIES: [&str; 6] = [
    "г. Махачкала",
    "г. Каспийск",
    "г. Дербент",
    "Агульский муниципальный район",
    "Акушинский муниципальный район",
    "Бабаюртовский муниципальный район",
];

pub const SUBJECTS: [&str; 2] = ["Русский язык", "Математика"];
pub const GRADES: [u32; 2] = [4, 5];
pub const YEARS: [i32; 3] = [2021, 2022, 2023];

/// Schools generated per municipality per year.
pub const SCHOOLS_PER_MUNICIPALITY: u32 = 10;

/// Build a deterministic demo dataset.
///
/// Every fifth school of each municipality receives two objectivity markers.
pub fn generate_mock() -> RecordStore {
    let mut marks = Vec::new();
    let mut scores = Vec::new();
    let mut bias = Vec::new();

    for year in YEARS {
        for muni in MUNICIPALITIES {
            for s in 1..=SCHOOLS_PER_MUNICIPALITY {
                let school_name = format!("ОО №{s} ({muni})");
                let login = format!("edu{year}{s}");

                for grade in GRADES {
                    for subject in SUBJECTS {
                        marks.push(MarkRecord {
                            year,
                            grade,
                            subject: subject.to_string(),
                            municipality: muni.to_string(),
                            login: login.clone(),
                            school_name: school_name.clone(),
                            participants: 100,
                            mark2: 5.0,
                            mark3: 20.0,
                            mark4: 50.0,
                            mark5: 25.0,
                        });

                        scores.push(ScoreRecord {
                            year,
                            grade,
                            subject: subject.to_string(),
                            municipality: muni.to_string(),
                            login: login.clone(),
                            school_name: school_name.clone(),
                            participants: 100,
                            scores: BTreeMap::from([(10, 5.0), (20, 10.0), (30, 85.0)]),
                        });
                    }
                }

                if s % 5 == 0 {
                    bias.push(BiasRecord {
                        year,
                        login: login.clone(),
                        municipality: muni.to_string(),
                        school_name: school_name.clone(),
                        total_markers: 2,
                        markers: BTreeMap::from([("РУ 4".to_string(), 1), ("МА 5".to_string(), 1)]),
                    });
                }
            }
        }
    }

    log::debug!(
        "generated {} marks, {} scores, {} bias records",
        marks.len(),
        scores.len(),
        bias.len()
    );
    RecordStore::new(marks, scores, bias)
}
