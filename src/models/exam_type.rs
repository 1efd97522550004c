use serde::{Deserialize, Serialize};

/// 考试类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamType {
    /// 期中
    Midterm,
    /// 期末
    Final,
    /// 模拟考
    Mock,
    /// 升学考试
    Entrance,
    /// 单元测验
    Quiz,
    /// 练习卷
    Practice,
}

impl ExamType {
    pub const ALL: [ExamType; 6] = [
        ExamType::Midterm,
        ExamType::Final,
        ExamType::Mock,
        ExamType::Entrance,
        ExamType::Quiz,
        ExamType::Practice,
    ];

    /// 获取标准名称
    pub fn as_str(self) -> &'static str {
        match self {
            ExamType::Midterm => "midterm",
            ExamType::Final => "final",
            ExamType::Mock => "mock",
            ExamType::Entrance => "entrance",
            ExamType::Quiz => "quiz",
            ExamType::Practice => "practice",
        }
    }

    /// 用于提示词的可读名称
    pub fn label(self) -> &'static str {
        match self {
            ExamType::Midterm => "Midterm exam",
            ExamType::Final => "Final exam",
            ExamType::Mock => "Mock exam",
            ExamType::Entrance => "Entrance exam",
            ExamType::Quiz => "Quiz",
            ExamType::Practice => "Practice paper",
        }
    }

    /// 尝试从字符串解析考试类型（精确匹配，支持常见别名）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "midterm" | "mid-term" | "mid_term" | "期中" => Some(ExamType::Midterm),
            "final" | "finals" | "期末" => Some(ExamType::Final),
            "mock" | "trial" | "模拟" => Some(ExamType::Mock),
            "entrance" | "admission" | "升学" => Some(ExamType::Entrance),
            "quiz" | "test" | "测验" => Some(ExamType::Quiz),
            "practice" | "exercise" | "练习" => Some(ExamType::Practice),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!(ExamType::parse("Mid-Term"), Some(ExamType::Midterm));
        assert_eq!(ExamType::parse(" final "), Some(ExamType::Final));
        assert_eq!(ExamType::parse("期末"), Some(ExamType::Final));
        assert_eq!(ExamType::parse("semester"), None);
    }

    #[test]
    fn test_as_str_parses_back() {
        for exam_type in ExamType::ALL {
            assert_eq!(ExamType::parse(exam_type.as_str()), Some(exam_type));
        }
    }
}
