//! weekdayRange / dateRange / timeRange
//!
//! 参数都以字符串传入；最后一个参数为 "GMT" 时按 UTC 计算，否则按本地时间。
//! 起点大于终点时视为跨周期（如 "FRI", "MON" 或 22 点到 6 点）。

use chrono::{Datelike, Local, NaiveDateTime, Timelike, Utc};

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];
const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// 求值时刻（本地与 UTC 各一份）
#[derive(Debug, Clone, Copy)]
pub struct Now {
    pub local: NaiveDateTime,
    pub utc: NaiveDateTime,
}

impl Now {
    pub fn current() -> Self {
        Self {
            local: Local::now().naive_local(),
            utc: Utc::now().naive_utc(),
        }
    }

    fn pick(&self, gmt: bool) -> NaiveDateTime {
        if gmt {
            self.utc
        } else {
            self.local
        }
    }
}

fn split_gmt(args: &[String]) -> (&[String], bool) {
    match args.split_last() {
        Some((last, rest)) if last == "GMT" => (rest, true),
        _ => (args, false),
    }
}

fn in_range<T: PartialOrd>(start: T, value: T, end: T) -> bool {
    if start <= end {
        start <= value && value <= end
    } else {
        value >= start || value <= end
    }
}

fn weekday_index(name: &str) -> Option<u32> {
    WEEKDAYS.iter().position(|d| *d == name).map(|i| i as u32)
}

fn month_number(name: &str) -> Option<u32> {
    MONTHS.iter().position(|m| *m == name).map(|i| i as u32 + 1)
}

pub fn weekday_range(args: &[String], now: &Now) -> bool {
    let (args, gmt) = split_gmt(args);
    let Some(first) = args.first() else {
        return false;
    };
    let (Some(wd1), Some(wd2)) = (
        weekday_index(first),
        weekday_index(args.get(1).unwrap_or(first)),
    ) else {
        return false;
    };
    let today = now.pick(gmt).weekday().num_days_from_sunday();
    in_range(wd1, today, wd2)
}

enum DateArg {
    Day(u32),
    Month(u32),
    Year(i32),
}

fn date_arg(text: &str) -> Option<DateArg> {
    match text.trim().parse::<i64>() {
        Ok(n) if (1..32).contains(&n) => Some(DateArg::Day(n as u32)),
        Ok(n) if n >= 32 => i32::try_from(n).ok().map(DateArg::Year),
        Ok(_) => None,
        Err(_) => month_number(text).map(DateArg::Month),
    }
}

pub fn date_range(args: &[String], now: &Now) -> bool {
    let (args, gmt) = split_gmt(args);
    let at = now.pick(gmt);
    let today = (at.year(), at.month(), at.day());

    let mut parsed = Vec::with_capacity(args.len());
    for arg in args {
        match date_arg(arg) {
            Some(a) => parsed.push(a),
            None => return false,
        }
    }

    match parsed.as_slice() {
        [] => false,
        [DateArg::Day(d)] => today.2 == *d,
        [DateArg::Month(m)] => today.1 == *m,
        [DateArg::Year(y)] => today.0 == *y,
        _ => {
            let half = parsed.len() / 2;
            let mut start = (today.0, 1, 1);
            let mut end = (today.0, 12, 31);
            let mut has_year = false;
            let mut only_days = parsed.len() <= 2;
            for (i, arg) in parsed.iter().enumerate() {
                let bound = if i < half { &mut start } else { &mut end };
                match arg {
                    DateArg::Day(d) => bound.2 = *d,
                    DateArg::Month(m) => {
                        bound.1 = *m;
                        only_days = false;
                    }
                    DateArg::Year(y) => {
                        bound.0 = *y;
                        has_year = true;
                        only_days = false;
                    }
                }
            }
            if only_days {
                start.1 = today.1;
                end.1 = today.1;
            }
            if has_year {
                start <= today && today <= end
            } else {
                in_range((start.1, start.2), (today.1, today.2), (end.1, end.2))
            }
        }
    }
}

/// 参数个数不是 1、2、4、6 时返回 Err
pub fn time_range(args: &[String], now: &Now) -> Result<bool, String> {
    let (args, gmt) = split_gmt(args);
    let at = now.pick(gmt);

    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        match arg.trim().parse::<u32>() {
            Ok(v) => values.push(v),
            Err(_) if matches!(args.len(), 0 | 1 | 2 | 4 | 6) => return Ok(false),
            Err(_) => break,
        }
    }

    let current = (at.hour(), at.minute(), at.second());
    let matched = match args.len() {
        0 => false,
        1 => current.0 == values[0],
        2 => in_range(values[0], current.0, values[1]),
        4 => in_range(
            (values[0], values[1], 0),
            current,
            (values[2], values[3], 59),
        ),
        6 => in_range(
            (values[0], values[1], values[2]),
            current,
            (values[3], values[4], values[5]),
        ),
        _ => return Err("timeRange: bad number of arguments".to_string()),
    };
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// 2024-03-15 是星期五
    fn friday_afternoon() -> Now {
        let local = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(14, 30, 10)
            .unwrap();
        let utc = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(22, 30, 10)
            .unwrap();
        Now { local, utc }
    }

    #[test]
    fn weekday_single_and_range() {
        let now = friday_afternoon();
        assert!(weekday_range(&args(&["FRI"]), &now));
        assert!(weekday_range(&args(&["MON", "FRI"]), &now));
        assert!(!weekday_range(&args(&["SAT", "SUN"]), &now));
        assert!(weekday_range(&args(&["THU", "MON"]), &now));
        assert!(!weekday_range(&args(&["fri"]), &now));
        assert!(!weekday_range(&[], &now));
    }

    #[test]
    fn weekday_gmt_uses_utc() {
        let mut now = friday_afternoon();
        now.utc = NaiveDate::from_ymd_opt(2024, 3, 16)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap();
        assert!(weekday_range(&args(&["SAT", "GMT"]), &now));
        assert!(!weekday_range(&args(&["SAT"]), &now));
    }

    #[test]
    fn date_single_forms() {
        let now = friday_afternoon();
        assert!(date_range(&args(&["15"]), &now));
        assert!(date_range(&args(&["MAR"]), &now));
        assert!(date_range(&args(&["2024"]), &now));
        assert!(!date_range(&args(&["APR"]), &now));
        assert!(!date_range(&args(&["1999"]), &now));
    }

    #[test]
    fn date_ranges() {
        let now = friday_afternoon();
        assert!(date_range(&args(&["1", "15"]), &now));
        assert!(!date_range(&args(&["16", "31"]), &now));
        assert!(date_range(&args(&["JAN", "MAR"]), &now));
        assert!(!date_range(&args(&["APR", "SEP"]), &now));
        assert!(date_range(&args(&["NOV", "MAR"]), &now));
        assert!(date_range(&args(&["1", "MAR", "15", "MAR"]), &now));
        assert!(date_range(&args(&["MAR", "2023", "MAR", "2024"]), &now));
        assert!(!date_range(&args(&["1", "JAN", "2023", "31", "DEC", "2023"]), &now));
        assert!(!date_range(&args(&["XYZ", "MAR"]), &now));
    }

    #[test]
    fn time_ranges() {
        let now = friday_afternoon();
        assert_eq!(time_range(&args(&["14"]), &now), Ok(true));
        assert_eq!(time_range(&args(&["9", "17"]), &now), Ok(true));
        assert_eq!(time_range(&args(&["22", "6"]), &now), Ok(false));
        assert_eq!(time_range(&args(&["22", "6", "GMT"]), &now), Ok(true));
        assert_eq!(time_range(&args(&["14", "0", "14", "30"]), &now), Ok(true));
        assert_eq!(time_range(&args(&["14", "31", "15", "0"]), &now), Ok(false));
        assert_eq!(
            time_range(&args(&["14", "30", "0", "14", "30", "5"]), &now),
            Ok(false)
        );
        assert_eq!(time_range(&[], &now), Ok(false));
    }

    #[test]
    fn time_range_bad_arity() {
        let now = friday_afternoon();
        assert!(time_range(&args(&["1", "2", "3"]), &now).is_err());
        assert!(time_range(&args(&["1", "2", "3", "4", "5"]), &now).is_err());
    }
}
