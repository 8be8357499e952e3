//! CSS color parsing for effective-background resolution.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

/// Colors with alpha below this are treated as see-through.
pub const OPAQUE_ALPHA: f64 = 0.9;

impl Rgba {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        if value.is_empty() || value == "none" {
            return None;
        }
        if value == "transparent" {
            return Some(Rgba { r: 0, g: 0, b: 0, a: 0.0 });
        }
        if let Some(hex) = value.strip_prefix('#') {
            return parse_hex(hex);
        }
        let inner = value
            .strip_prefix("rgba(")
            .or_else(|| value.strip_prefix("rgb("))?
            .strip_suffix(')')?;
        let parts: Vec<&str> = inner
            .split([',', ' ', '/'])
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() < 3 {
            return None;
        }
        let channel = |s: &str| -> Option<u8> {
            if let Some(pct) = s.strip_suffix('%') {
                let v: f64 = pct.parse().ok()?;
                Some((v.clamp(0.0, 100.0) * 2.55).round() as u8)
            } else {
                let v: f64 = s.parse().ok()?;
                Some(v.clamp(0.0, 255.0).round() as u8)
            }
        };
        let a = match parts.get(3) {
            Some(raw) => match raw.strip_suffix('%') {
                Some(pct) => pct.parse::<f64>().ok()? / 100.0,
                None => raw.parse::<f64>().ok()?,
            },
            None => 1.0,
        };
        Some(Rgba {
            r: channel(parts[0])?,
            g: channel(parts[1])?,
            b: channel(parts[2])?,
            a: a.clamp(0.0, 1.0),
        })
    }

    pub fn is_opaque(&self) -> bool {
        self.a >= OPAQUE_ALPHA
    }

    pub fn to_css(&self) -> String {
        if self.a >= 1.0 {
            format!("rgb({}, {}, {})", self.r, self.g, self.b)
        } else {
            format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
        }
    }

    /// Spread between the strongest and weakest channel, 0..=255.
    pub fn chroma(&self) -> u8 {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        max - min
    }

    /// Closest basic color name.
    pub fn name(&self) -> &'static str {
        const NAMED: &[(&str, (i32, i32, i32))] = &[
            ("black", (0, 0, 0)),
            ("white", (255, 255, 255)),
            ("gray", (128, 128, 128)),
            ("silver", (192, 192, 192)),
            ("red", (220, 38, 38)),
            ("orange", (249, 115, 22)),
            ("yellow", (234, 179, 8)),
            ("green", (22, 163, 74)),
            ("teal", (13, 148, 136)),
            ("blue", (37, 99, 235)),
            ("navy", (30, 41, 100)),
            ("purple", (147, 51, 234)),
            ("pink", (236, 72, 153)),
            ("brown", (120, 72, 40)),
        ];
        if self.a < OPAQUE_ALPHA {
            return "transparent";
        }
        let (r, g, b) = (self.r as i32, self.g as i32, self.b as i32);
        NAMED
            .iter()
            .min_by_key(|(_, (nr, ng, nb))| {
                (r - nr).pow(2) + (g - ng).pow(2) + (b - nb).pow(2)
            })
            .map(|(name, _)| *name)
            .unwrap_or("gray")
    }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    let expand = |c: char| -> Option<u8> {
        let d = c.to_digit(16)? as u8;
        Some(d * 16 + d)
    };
    let pair = |s: &str| u8::from_str_radix(s, 16).ok();
    let chars: Vec<char> = hex.chars().collect();
    match chars.len() {
        3 | 4 => Some(Rgba {
            r: expand(chars[0])?,
            g: expand(chars[1])?,
            b: expand(chars[2])?,
            a: match chars.get(3) {
                Some(c) => expand(*c)? as f64 / 255.0,
                None => 1.0,
            },
        }),
        6 | 8 if hex.is_ascii() => Some(Rgba {
            r: pair(&hex[0..2])?,
            g: pair(&hex[2..4])?,
            b: pair(&hex[4..6])?,
            a: if hex.len() == 8 {
                pair(&hex[6..8])? as f64 / 255.0
            } else {
                1.0
            },
        }),
        _ => None,
    }
}
