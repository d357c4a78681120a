// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! The fixed practice checklist and the user's selection over it.

use crate::{EcoError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PracticeCategory {
    Daily,
    Culture,
    Environment,
}

impl PracticeCategory {
    pub const ALL: [PracticeCategory; 3] = [Self::Daily, Self::Culture, Self::Environment];

    pub fn title(self) -> &'static str {
        match self {
            Self::Daily => "실천 행동의 일상화",
            Self::Culture => "실천 문화 확산",
            Self::Environment => "학교 환경 조성",
        }
    }

    /// Label used in the exported report.
    pub fn short_title(self) -> &'static str {
        match self {
            Self::Daily => "실천 행동",
            Self::Culture => "실천 문화",
            Self::Environment => "환경 구성",
        }
    }

    pub fn items(self) -> impl Iterator<Item = &'static Practice> {
        CATALOG.iter().filter(move |p| p.category == self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Practice {
    pub id: &'static str,
    pub category: PracticeCategory,
    pub label: &'static str,
}

const fn practice(id: &'static str, category: PracticeCategory, label: &'static str) -> Practice {
    Practice {
        id,
        category,
        label,
    }
}

use PracticeCategory::{Culture, Daily, Environment};

pub const CATALOG: [Practice; 29] = [
    practice("daily-01", Daily, "학교 탄소중립 실천 과제 선정 및 실천"),
    practice("daily-02", Daily, "학교 탄소 배출 데이터 정기적 공유"),
    practice("daily-03", Daily, "피크전력 시간대 확인 및 감축 관리"),
    practice("daily-04", Daily, "학교 자원 대기전력 차단 관리"),
    practice("daily-05", Daily, "디벗 충전 및 관리 기준 수립"),
    practice("daily-06", Daily, "공간별·시설별 조명 및 냉난방 규칙 마련"),
    practice("daily-07", Daily, "학교 자원 일회용품 사용 자제 약속"),
    practice("daily-08", Daily, "학교 자원 종이 인쇄물 사용 자제 약속"),
    practice("daily-09", Daily, "재활용을 위한 분리배출 규칙 준수"),
    practice("culture-01", Culture, "탄소중립 학생 교육 프로그램 · 프로젝트 운영"),
    practice("culture-02", Culture, "학생 기후행동 동아리 운영"),
    practice("culture-03", Culture, "교직원 탄소중립 연수 운영"),
    practice("culture-04", Culture, "교직원 학습공동체 운영"),
    practice("culture-05", Culture, "학부모 및 지역 연계 프로그램 · 프로젝트 운영"),
    practice(
        "culture-06",
        Culture,
        "학교 차원 탄소저감 생활규칙 마련 (물품 구매, 등하교 방법 등)",
    ),
    practice("culture-07", Culture, "학생 주도 나눔 장터 운영"),
    practice("culture-08", Culture, "피복 돌려주기 상시 운영"),
    practice("culture-09", Culture, "정기 채식 급식의 날 운영"),
    practice("culture-10", Culture, "음식물 쓰레기 줄이기 프로그램 운영"),
    practice("culture-11", Culture, "지역 농산물 적극 활용"),
    practice("culture-12", Culture, "지역 푸드뱅크 활용"),
    practice("env-01", Environment, "교내 탄소 문해력 교육 공간(게시판) 운영"),
    practice("env-02", Environment, "태양광 패널 설치 및 발전량 활용 교육 연계"),
    practice(
        "env-03",
        Environment,
        "냉 · 난방 효율 향상을 위한 에코 쿨루프 등 환경 개선 사업 추진",
    ),
    practice("env-04", Environment, "단열 강화를 위한 창문 단열필름 등 간단한 시설 개선"),
    practice("env-05", Environment, "학교 텃밭 운영을 위한 빗물저금통 설치 및 활용"),
    practice("env-06", Environment, "절수형 화장실 설비 도입 또는 단계적 개선"),
    practice(
        "env-07",
        Environment,
        "학교 숲, 텃밭을 활용한 생태 · 탄소중립 연계 교육 프로그램 운영",
    ),
    practice("env-08", Environment, "분리배출장을 활용한 자원순환 교육 프로그램 운영"),
];

pub fn find_practice(id: &str) -> Option<&'static Practice> {
    CATALOG.iter().find(|p| p.id == id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryProgress {
    pub category: PracticeCategory,
    pub title: &'static str,
    pub selected: usize,
    pub total: usize,
    pub percent: u32,
}

/// Adopted practice ids. Stored as `{id: true}`; `false` entries and ids
/// outside the catalog are dropped on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, bool>", into = "BTreeMap<String, bool>")]
pub struct PracticeSelection {
    adopted: BTreeSet<String>,
}

impl From<BTreeMap<String, bool>> for PracticeSelection {
    fn from(map: BTreeMap<String, bool>) -> Self {
        let adopted = map
            .into_iter()
            .filter(|(id, on)| *on && find_practice(id).is_some())
            .map(|(id, _)| id)
            .collect();
        Self { adopted }
    }
}

impl From<PracticeSelection> for BTreeMap<String, bool> {
    fn from(selection: PracticeSelection) -> Self {
        selection.adopted.into_iter().map(|id| (id, true)).collect()
    }
}

impl PracticeSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips one practice and returns its new state.
    pub fn toggle(&mut self, id: &str) -> Result<bool> {
        let adopted = !self.is_adopted(id);
        self.set(id, adopted)?;
        Ok(adopted)
    }

    pub fn set(&mut self, id: &str, adopted: bool) -> Result<()> {
        let practice = find_practice(id)
            .ok_or_else(|| EcoError::Validation(format!("unknown practice id: {}", id)))?;
        if adopted {
            self.adopted.insert(practice.id.to_string());
        } else {
            self.adopted.remove(practice.id);
        }
        Ok(())
    }

    pub fn is_adopted(&self, id: &str) -> bool {
        self.adopted.contains(id)
    }

    pub fn total_selected(&self) -> usize {
        self.adopted.len()
    }

    pub fn adopted(&self) -> impl Iterator<Item = &str> {
        self.adopted.iter().map(String::as_str)
    }

    pub fn category_progress(&self) -> Vec<CategoryProgress> {
        PracticeCategory::ALL
            .into_iter()
            .map(|category| {
                let total = category.items().count();
                let selected = category.items().filter(|p| self.is_adopted(p.id)).count();
                let percent = if total == 0 {
                    0
                } else {
                    (selected as f64 * 100.0 / total as f64).round() as u32
                };
                CategoryProgress {
                    category,
                    title: category.title(),
                    selected,
                    total,
                    percent,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_shape() {
        assert_eq!(CATALOG.len(), 29);
        let counts: Vec<usize> = PracticeCategory::ALL
            .iter()
            .map(|c| c.items().count())
            .collect();
        assert_eq!(counts, vec![9, 12, 8]);
        let ids: BTreeSet<&str> = CATALOG.iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), 29);
    }

    #[test]
    fn test_toggle_twice_is_identity() {
        let mut selection = PracticeSelection::new();
        selection.set("env-02", true).unwrap();
        let before = selection.clone();

        assert!(selection.toggle("daily-03").unwrap());
        assert!(!selection.toggle("daily-03").unwrap());
        assert_eq!(selection, before);
    }

    #[test]
    fn test_unknown_id_is_rejected() {
        let mut selection = PracticeSelection::new();
        assert!(selection.toggle("daily-99").is_err());
        assert_eq!(selection.total_selected(), 0);
    }

    #[test]
    fn test_category_progress_rounds() {
        let mut selection = PracticeSelection::new();
        for id in ["daily-01", "culture-01", "culture-02", "env-01"] {
            selection.set(id, true).unwrap();
        }
        let progress = selection.category_progress();
        assert_eq!(progress[0].percent, 11); // 1/9
        assert_eq!(progress[1].percent, 17); // 2/12
        assert_eq!(progress[2].percent, 13); // 1/8 = 12.5
        assert_eq!(progress[2].title, "학교 환경 조성");
    }

    #[test]
    fn test_storage_shape_drops_false_and_unknown() {
        let selection: PracticeSelection = serde_json::from_str(
            r#"{"daily-01": true, "daily-02": false, "legacy-01": true}"#,
        )
        .unwrap();
        assert_eq!(selection.total_selected(), 1);
        assert_eq!(
            serde_json::to_string(&selection).unwrap(),
            r#"{"daily-01":true}"#
        );
    }
}
