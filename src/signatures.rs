use regex::RegexSet;
use serde::{Deserialize, Serialize};

pub const NO_RECOGNIZED_PATTERN: &str = "No recognized pattern. Check the faulting module and exception code above.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub pattern: String,
    pub explanation: String,
}

/// Known fault substrings, most specific first. Order here is the order explanations are reported in.
const BUILTIN: &[(&str, &str)] = &[
    ("0xc0000005", "Access violation (0xC0000005): the program read or wrote memory it does not own. Usually a game bug, a bad mod, or an overlay/injector hooking the process."),
    ("0xc0000374", "Heap corruption (0xC0000374): memory was damaged before the crash. Suspect mods, outdated drivers, or unstable RAM/overclock."),
    ("0xc0000409", "Stack buffer overrun / fail-fast (0xC0000409): the program aborted itself after detecting corrupted state."),
    ("0xc00000fd", "Stack overflow (0xC00000FD): runaway recursion or too-large stack allocation."),
    ("0xc000001d", "Illegal instruction (0xC000001D): the CPU lacks an instruction the build requires (e.g. AVX), or the binary is damaged."),
    ("0xc0000096", "Privileged instruction (0xC0000096): often anti-cheat or DRM conflicting with another tool."),
    ("0xc0000094", "Integer divide by zero (0xC0000094): a game logic bug, sometimes triggered by unusual settings or resolutions."),
    ("0xc0000006", "In-page I/O error (0xC0000006): the executable or a DLL could not be read from disk. Check the drive and verify game files."),
    ("0xc0000135", "DLL not found (0xC0000135): a required runtime is missing. Reinstall the Visual C++ redistributables and DirectX runtime."),
    ("0xc0000142", "DLL initialization failed (0xC0000142): a dependency failed to load at startup. Reinstall runtimes and verify game files."),
    ("0xc000041d", "Unhandled exception in a user callback (0xC000041D): frequently caused by overlays or input hooks."),
    ("0xe06d7363", "Unhandled C++ exception (0xE06D7363): the game threw an error it did not catch. Check the game's own log files."),
    ("0x80000003", "Breakpoint (0x80000003): the program hit a debug assertion or deliberately crashed itself."),
    ("0x887a0006", "GPU hung (DXGI_ERROR_DEVICE_HUNG): the graphics card stopped responding. Update GPU drivers, lower settings, check overclocks."),
    ("0x887a0005", "GPU device removed (DXGI_ERROR_DEVICE_REMOVED): the graphics driver crashed or was reset. Update or clean-reinstall GPU drivers."),
    ("nvlddmkm", "NVIDIA kernel driver (nvlddmkm) involved: update or clean-reinstall the NVIDIA driver; check GPU overclock and temperatures."),
    ("nvwgf2um", "NVIDIA DirectX user-mode driver involved: update the NVIDIA driver, disable overlays, and verify game files."),
    ("nvoglv", "NVIDIA OpenGL driver involved: update the NVIDIA driver."),
    ("atikmdag", "AMD kernel driver (atikmdag) involved: update or clean-reinstall the AMD driver."),
    ("amdkmdag", "AMD kernel driver (amdkmdag) involved: update or clean-reinstall the AMD driver."),
    ("atidxx64", "AMD DirectX driver involved: update the AMD driver."),
    ("amdxx64", "AMD DirectX driver involved: update the AMD driver."),
    ("igd10iumd", "Intel graphics driver involved: update the Intel GPU driver or make sure the game runs on the dedicated GPU."),
    ("igdumdim", "Intel graphics driver involved: update the Intel GPU driver or make sure the game runs on the dedicated GPU."),
    ("d3d11.dll", "Direct3D 11 runtime involved: usually a GPU driver problem; update drivers and the DirectX runtime."),
    ("d3d12.dll", "Direct3D 12 runtime involved: usually a GPU driver problem; try the game's DX11 mode if available."),
    ("dxgi.dll", "DXGI involved: graphics driver or overlay problem; update drivers and disable overlays."),
    ("vulkan-1.dll", "Vulkan loader involved: update GPU drivers; a stale Vulkan layer from an overlay can also cause this."),
    ("ntdll.dll", "Crash inside ntdll.dll: a generic symptom of memory corruption; the real cause is usually elsewhere (mods, overlays, RAM)."),
    ("kernelbase.dll", "Crash inside KernelBase.dll: the program raised an exception it did not handle; check the exception code."),
    ("ucrtbase.dll", "C runtime (ucrtbase.dll) involved: the program aborted; repair the Visual C++ redistributables."),
    ("vcruntime140", "Visual C++ runtime involved: repair or reinstall the Visual C++ 2015-2022 redistributables."),
    ("msvcp140", "Visual C++ runtime involved: repair or reinstall the Visual C++ 2015-2022 redistributables."),
    ("xinput1_", "XInput (controller) DLL involved: reconnect controllers and remove third-party input wrappers."),
    ("gameoverlayrenderer", "Steam overlay involved: try disabling the Steam overlay for this game."),
    ("discordhook", "Discord overlay involved: try disabling the Discord in-game overlay."),
    ("rtsshooks", "RivaTuner/MSI Afterburner overlay involved: close RTSS or exclude the game."),
    ("easyanticheat", "Easy Anti-Cheat involved: repair the anti-cheat service from the game's install folder."),
    ("beclient", "BattlEye anti-cheat involved: reinstall BattlEye via the game's launcher."),
    ("steam_api", "Steam API DLL involved: verify game files through Steam."),
    ("fmod", "FMOD audio library involved: check audio devices and drivers; switching the default output device can help."),
    ("clr.dll", ".NET runtime involved: repair the .NET Framework installation."),
    ("coreclr.dll", ".NET runtime involved: repair the .NET runtime the game ships with."),
    ("unityplayer.dll", "Unity engine player involved: check the game's Player.log in its AppData LocalLow folder."),
    ("apphang", "The application stopped responding (hang) and was closed by Windows."),
];

/// The ordered signature table. Built once and never mutated.
#[derive(Clone, Debug)]
pub struct SignatureTable {
    entries: Vec<SignatureEntry>,
    set: Option<RegexSet>,
}

impl Default for SignatureTable {
    fn default() -> Self { Self::builtin() }
}

impl SignatureTable {
    pub fn builtin() -> Self {
        Self::new(BUILTIN.iter().map(|(p, e)| SignatureEntry { pattern: p.to_string(), explanation: e.to_string() }).collect())
    }

    /// Patterns are lowercased; empty patterns are dropped.
    pub fn new(entries: Vec<SignatureEntry>) -> Self {
        let entries: Vec<SignatureEntry> = entries
            .into_iter()
            .filter(|e| !e.pattern.is_empty())
            .map(|e| SignatureEntry { pattern: e.pattern.to_lowercase(), explanation: e.explanation })
            .collect();
        let set = match RegexSet::new(entries.iter().map(|e| regex::escape(&e.pattern))) {
            Ok(s) => Some(s),
            Err(e) => { log::warn!("signature set did not compile, scanning linearly: {}", e); None }
        };
        Self { entries, set }
    }

    /// A new table with `extra` appended after the current entries.
    pub fn extended(&self, extra: Vec<SignatureEntry>) -> Self {
        let mut all = self.entries.clone();
        all.extend(extra);
        Self::new(all)
    }

    pub fn entries(&self) -> &[SignatureEntry] { &self.entries }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Every explanation whose pattern occurs in `text`, in table order. Falls back to
    /// [`NO_RECOGNIZED_PATTERN`] when nothing matches.
    pub fn interpret(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let hits: Vec<usize> = match &self.set {
            Some(set) => set.matches(&lower).into_iter().collect(),
            None => self.entries.iter().enumerate().filter(|(_, e)| lower.contains(&e.pattern)).map(|(i, _)| i).collect(),
        };
        let mut out: Vec<String> = Vec::new();
        for i in hits {
            let exp = &self.entries[i].explanation;
            if !out.contains(exp) { out.push(exp.clone()); }
        }
        if out.is_empty() { out.push(NO_RECOGNIZED_PATTERN.to_string()); }
        out
    }
}

#[derive(Debug, Default, Deserialize)]
struct Registry {
    #[serde(default)]
    signatures: Vec<SignatureEntry>,
}

/// Reads a JSON signature registry: `{"signatures": [{"pattern": .., "explanation": ..}]}`.
pub fn load_registry(path: &std::path::Path) -> anyhow::Result<Vec<SignatureEntry>> {
    use anyhow::Context;
    let data = std::fs::read(path).with_context(|| format!("reading signature registry {}", path.to_string_lossy()))?;
    let reg: Registry = serde_json::from_slice(&data).with_context(|| format!("parsing signature registry {}", path.to_string_lossy()))?;
    Ok(reg.signatures)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_violation_then_nvidia_driver() {
        let out = SignatureTable::builtin().interpret("Faulting module nvlddmkm.sys, exception code 0xC0000005 at offset 0x1a2b");
        assert_eq!(out.len(), 2);
        assert!(out[0].starts_with("Access violation"));
        assert!(out[1].starts_with("NVIDIA kernel driver"));
    }

    #[test]
    fn table_order_wins_over_text_order() {
        let out = SignatureTable::builtin().interpret("... 0xc0000005 ... nvlddmkm ...");
        assert_eq!(out.len(), 2);
        assert!(out[0].contains("0xC0000005"));
        assert!(out[1].contains("nvlddmkm"));
    }

    #[test]
    fn benign_text_gets_the_sentinel() {
        assert_eq!(SignatureTable::builtin().interpret("benign text"), vec![NO_RECOGNIZED_PATTERN.to_string()]);
    }

    #[test]
    fn identical_explanations_collapse() {
        let out = SignatureTable::builtin().interpret("vcruntime140.dll and msvcp140.dll");
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn interpretation_is_idempotent() {
        let t = SignatureTable::builtin();
        let text = "d3d12.dll 0x887a0006 gameoverlayrenderer64.dll";
        assert_eq!(t.interpret(text), t.interpret(text));
        assert_eq!(t.interpret(text).len(), 3);
    }

    #[test]
    fn extra_entries_are_lowercased_and_appended() {
        let t = SignatureTable::builtin().extended(vec![SignatureEntry { pattern: "MyMod.DLL".into(), explanation: "custom".into() }]);
        assert_eq!(t.len(), BUILTIN.len() + 1);
        assert_eq!(t.interpret("0xc0000005 in mymod.dll"), vec![SignatureTable::builtin().interpret("0xc0000005")[0].clone(), "custom".to_string()]);
    }

    #[test]
    fn patterns_with_regex_metacharacters_are_literal() {
        let t = SignatureTable::new(vec![SignatureEntry { pattern: "a.b(".into(), explanation: "x".into() }]);
        assert_eq!(t.interpret("a.b("), vec!["x".to_string()]);
        assert_eq!(t.interpret("axb("), vec![NO_RECOGNIZED_PATTERN.to_string()]);
    }

    #[test]
    fn registry_loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("signatures.json");
        std::fs::write(&p, r#"{"signatures":[{"pattern":"reshade","explanation":"ReShade injector involved"}]}"#).unwrap();
        let entries = load_registry(&p).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pattern, "reshade");
        assert!(load_registry(&dir.path().join("missing.json")).is_err());
    }
}
