//! Cosmetic status phrases shown while a cycle is working.

use rand::seq::IndexedRandom;

const TYPING: &[&str] = &[
    "Processing your request, please wait...",
    "Crunching the data...",
    "Analyzing input...",
    "Fetching relevant information...",
    "Please stand by...",
    "Working on your request...",
];

const IMAGE_ANALYSIS: &[&str] = &[
    "Analyzing the image details...",
    "Processing image content...",
    "Fetching insights from the image...",
    "Decoding visual elements...",
    "Evaluating image specifics...",
];

const IMAGE_GENERATION: &[&str] = &[
    "Generating an image of {}...",
    "Crafting an image representation of {}...",
    "Rendering image based on {}...",
    "Illustrating your idea of {}...",
    "Creating a visual for {}...",
    "Conjuring an image for {}...",
];

const SEARCH: &[&str] = &[
    "Searching for \"{}\"...",
    "Looking up \"{}\" on the web...",
    "Diving into the web for \"{}\"...",
    "Hunting for information on \"{}\"...",
    "Surfing the internet for \"{}\"...",
    "Scouring the web for \"{}\"...",
];

const SCRAPE: &[&str] = &[
    "Retrieving data from {}...",
    "Extracting content from {}...",
    "Gathering info from {}...",
    "Pulling data off of {}...",
    "Mining information from {}...",
    "Fetching the latest from {}...",
];

fn pick(pool: &[&'static str]) -> &'static str {
    pool.choose(&mut rand::rng()).copied().unwrap_or("...")
}

fn pick_with(pool: &[&'static str], subject: &str) -> String {
    pick(pool).replacen("{}", subject, 1)
}

pub fn typing() -> &'static str {
    pick(TYPING)
}

pub fn image_analysis() -> &'static str {
    pick(IMAGE_ANALYSIS)
}

pub fn image_generation(prompt: &str) -> String {
    pick_with(IMAGE_GENERATION, prompt)
}

pub fn search(term: &str) -> String {
    pick_with(SEARCH, term)
}

pub fn scrape(url: &str) -> String {
    pick_with(SCRAPE, url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrases_come_from_pools() {
        assert!(TYPING.contains(&typing()));
        assert!(IMAGE_ANALYSIS.contains(&image_analysis()));
    }

    #[test]
    fn subject_is_substituted() {
        let phrase = search("rust async");
        assert!(phrase.contains("\"rust async\""), "{phrase}");
        assert!(!phrase.contains("{}"));
        assert!(scrape("https://example.com").contains("https://example.com"));
        assert!(image_generation("a cat").contains("a cat"));
    }
}
