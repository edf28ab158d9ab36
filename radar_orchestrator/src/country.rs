// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! Source-name to output-folder mapping. Per-source PNGs live under
//! `{root}/{country}/{unix_ts}.png`.

pub fn country_folder(source: &str) -> &'static str {
    match source {
        "dwd" => "germany",
        "shmu" => "slovakia",
        "chmi" => "czechia",
        "arso" => "slovenia",
        "omsz" => "hungary",
        "imgw" => "poland",
        _ => "unknown",
    }
}
