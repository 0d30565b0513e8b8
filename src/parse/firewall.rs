use std::sync::LazyLock;

use regex::Regex;

use crate::model::FirewallRule;

// @0 pass in on en0 proto tcp from any to any port = 22
static RULE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@(\d+)\s+(.*)$").expect("valid regex"));

// [ Evaluations: 1234  Packets: 5678  Bytes: 91011  States: 12 ]
static COUNTER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\s*Evaluations:\s*\d+\s+Packets:\s*(\d+)\s+Bytes:\s*(\d+)").expect("valid regex")
});

const PORT_OPERATORS: [&str; 8] = ["=", "!=", "<", ">", "<=", ">=", "<>", "><"];

/// Parse `pfctl -vsr` output.
///
/// A line starting with `@<n>` opens a rule. The line right after it is
/// checked for an evaluation-counter summary; when present its packet and
/// byte counts attach to the rule and the line is consumed. Everything else
/// is skipped.
pub fn parse_pfctl(output: &str) -> Vec<FirewallRule> {
    let lines: Vec<&str> = output.lines().collect();
    let mut rules = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].trim();
        i += 1;

        let Some(caps) = RULE_LINE.captures(line) else {
            continue;
        };
        let Ok(rule_num) = caps[1].parse::<u32>() else {
            continue;
        };

        let text = &caps[2];
        let mut rule = FirewallRule {
            rule_num,
            raw_rule: text.to_string(),
            ..Default::default()
        };
        parse_rule_fields(text, &mut rule);

        if let Some(next) = lines.get(i)
            && let Some(counters) = COUNTER_LINE.captures(next)
        {
            rule.packets = counters[1].parse().unwrap_or(0);
            rule.bytes = counters[2].parse().unwrap_or(0);
            i += 1;
        }

        rules.push(rule);
    }

    rules
}

fn parse_rule_fields(text: &str, rule: &mut FirewallRule) {
    let fields: Vec<&str> = text.split_whitespace().collect();
    let Some(action) = fields.first() else {
        return;
    };
    rule.action = action.to_string();

    for (i, field) in fields.iter().enumerate() {
        match *field {
            "in" | "out" if rule.direction.is_empty() => rule.direction = field.to_string(),
            "proto" => {
                if let Some(p) = fields.get(i + 1) {
                    rule.proto = p.to_string();
                }
            }
            "from" => rule.src = address_spec(&fields, i + 1),
            "to" => rule.dst = address_spec(&fields, i + 1),
            _ => {}
        }
    }
}

/// The address after `from`/`to`, greedily extended with a trailing
/// `port [op] <value>` clause.
fn address_spec(fields: &[&str], start: usize) -> String {
    let mut i = start;
    let mut parts: Vec<&str> = Vec::new();

    if fields.get(i) == Some(&"!") {
        parts.push("!");
        i += 1;
    }
    let Some(addr) = fields.get(i) else {
        return parts.join(" ");
    };
    parts.push(*addr);
    i += 1;

    if fields.get(i) == Some(&"port") {
        match (fields.get(i + 1), fields.get(i + 2)) {
            (Some(op), Some(value)) if PORT_OPERATORS.contains(op) => {
                parts.extend(["port", *op, *value]);
            }
            (Some(value), _) if !PORT_OPERATORS.contains(value) => {
                parts.extend(["port", *value]);
            }
            _ => {}
        }
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_with_counters() {
        let output = "@3 pass in proto tcp from any to any port = 22\n  [ Evaluations: 10  Packets: 7  Bytes: 420  States: 1 ]\n";
        let rules = parse_pfctl(output);
        assert_eq!(rules.len(), 1);
        let r = &rules[0];
        assert_eq!(r.rule_num, 3);
        assert_eq!(r.action, "pass");
        assert_eq!(r.direction, "in");
        assert_eq!(r.proto, "tcp");
        assert_eq!(r.src, "any");
        assert!(r.dst.contains("port = 22"));
        assert_eq!(r.packets, 7);
        assert_eq!(r.bytes, 420);
        assert_eq!(r.raw_rule, "pass in proto tcp from any to any port = 22");
    }

    #[test]
    fn rule_without_counters_keeps_following_rule() {
        let output = "\
@0 scrub-anchor \"com.apple/*\" all fragment reassemble
@1 block drop out on en0 proto udp from ! 10.0.0.0/8 to any
  [ Evaluations: 5  Packets: 2  Bytes: 96  States: 0 ]
";
        let rules = parse_pfctl(output);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].rule_num, 0);
        assert_eq!(rules[0].action, "scrub-anchor");
        assert_eq!(rules[0].packets, 0);

        let r = &rules[1];
        assert_eq!(r.action, "block");
        assert_eq!(r.direction, "out");
        assert_eq!(r.proto, "udp");
        assert_eq!(r.src, "! 10.0.0.0/8");
        assert_eq!(r.dst, "any");
        assert_eq!(r.packets, 2);
        assert_eq!(r.bytes, 96);
    }

    #[test]
    fn first_direction_wins() {
        let rules = parse_pfctl("@7 pass out on lo0 all label in");
        assert_eq!(rules[0].direction, "out");
    }

    #[test]
    fn counter_line_is_not_rescanned() {
        // A counter line that follows a counter line is just noise.
        let output = "\
@2 pass all
[ Evaluations: 1  Packets: 1  Bytes: 60  States: 0 ]
[ Evaluations: 9  Packets: 9  Bytes: 900  States: 0 ]
";
        let rules = parse_pfctl(output);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].bytes, 60);
    }

    #[test]
    fn bare_port_value() {
        let rules = parse_pfctl("@4 pass in proto tcp from any port 1024:65535 to any");
        assert_eq!(rules[0].src, "any port 1024:65535");
    }

    #[test]
    fn non_rule_lines_skipped() {
        let output = "No ALTQ support in kernel\nALTQ related functions disabled\n";
        assert!(parse_pfctl(output).is_empty());
    }
}
