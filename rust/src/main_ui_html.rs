pub fn build_main_ui_html() -> String {
    MAIN_UI_HTML.to_string()
}

const MAIN_UI_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>SuperNate Generator</title>
  <style>
    :root {
      --bg-from: #000000;
      --bg-to: #3730a3;
      --panel: #111827;
      --line: #6b7280;
      --text: #f3f4f6;
      --muted: #d1d5db;
      --accent: #fdba74;
      --btn-bg: #4338ca;
      --btn-hover: #4f46e5;
      --warn-bg: #ef4444;
    }
    * { box-sizing: border-box; }
    body {
      margin: 0;
      min-height: 100vh;
      color: var(--text);
      background: linear-gradient(to top right, var(--bg-from), var(--bg-to));
      font-family: system-ui, -apple-system, "Segoe UI", sans-serif;
    }
    .wrap {
      max-width: 1200px;
      margin: 0 auto;
      padding: 64px 16px;
      display: flex;
      flex-wrap: wrap;
      gap: 64px;
    }
    .form {
      flex: 1 1 560px;
      display: flex;
      flex-direction: column;
      gap: 32px;
    }
    h1 {
      margin: 0;
      font-size: 56px;
      letter-spacing: -1px;
    }
    h2 {
      margin: 8px 0 0;
      font-size: 20px;
      font-weight: 400;
      color: var(--muted);
    }
    .rule {
      height: 1px;
      background: #ffffff;
    }
    .sentence {
      display: flex;
      flex-wrap: wrap;
      align-items: center;
      gap: 12px;
      font-size: 20px;
      color: var(--muted);
    }
    .sentence select {
      color: var(--accent);
      background: transparent;
      border: none;
      font-size: 20px;
    }
    .grid {
      display: grid;
      grid-template-columns: 1fr 1fr;
      gap: 16px;
    }
    .field {
      display: flex;
      flex-direction: column;
      gap: 8px;
    }
    .field label {
      font-size: 18px;
    }
    select, textarea, button {
      font: inherit;
    }
    .field select, .field textarea {
      width: 100%;
      padding: 14px;
      color: #ffffff;
      background: var(--panel);
      border: 1px solid var(--line);
      border-radius: 12px;
      font-size: 16px;
    }
    .field textarea {
      resize: vertical;
    }
    .prompt-title {
      font-size: 18px;
      color: #e5e7eb;
    }
    .prompt {
      margin-top: 12px;
      color: #e5e7eb;
      line-height: 1.4;
    }
    .banner {
      padding: 8px 12px;
      border-radius: 8px;
      color: #ffffff;
      background: var(--warn-bg);
    }
    .banner.error {
      background: #7f1d1d;
    }
    .hidden {
      display: none;
    }
    .actions {
      display: flex;
      justify-content: flex-end;
      gap: 12px;
    }
    .btn {
      min-width: 140px;
      padding: 12px 32px;
      border: none;
      border-radius: 12px;
      color: #ffffff;
      background: var(--btn-bg);
      cursor: pointer;
    }
    .btn:hover {
      background: var(--btn-hover);
    }
    .btn.secondary {
      background: transparent;
      border: 1px solid var(--line);
    }
    .btn:disabled {
      opacity: 0.6;
      cursor: progress;
    }
    .loader {
      display: inline-block;
      width: 18px;
      height: 18px;
      border: 3px solid #ffffff;
      border-bottom-color: transparent;
      border-radius: 50%;
      animation: spin 1s linear infinite;
    }
    @keyframes spin {
      to { transform: rotate(360deg); }
    }
    .result {
      flex: 0 1 512px;
      display: flex;
      flex-direction: column;
      align-items: center;
      gap: 8px;
    }
    .result img {
      width: 512px;
      max-width: 100%;
      border-radius: 8px;
    }
    .status {
      min-height: 16px;
      color: var(--muted);
      font-size: 12px;
    }
    @media (max-width: 900px) {
      h1 { font-size: 36px; }
      .grid { grid-template-columns: 1fr; }
    }
  </style>
</head>
<body>
  <main class="wrap">
    <section class="form">
      <div>
        <h1>SuperNate Generator</h1>
        <h2>What would Nate look like if he was a superhero depicted in various artistic styles?</h2>
      </div>
      <div class="rule"></div>
      <div id="sentence" class="sentence"></div>
      <div id="dropdowns" class="grid"></div>
      <div class="grid">
        <div class="field">
          <label for="environment">Environment</label>
          <textarea id="environment" rows="4"></textarea>
        </div>
        <div class="field">
          <label for="descriptors">Descriptors</label>
          <textarea id="descriptors" rows="4"></textarea>
        </div>
      </div>
      <div class="rule"></div>
      <div>
        <div class="prompt-title">Full prompt</div>
        <div id="prompt" class="prompt"></div>
      </div>
      <div id="warming" class="banner hidden" role="status" aria-live="polite"></div>
      <div id="failure" class="banner error hidden" role="alert"></div>
      <div class="actions">
        <button id="reset" class="btn secondary">Reset</button>
        <button id="generate" class="btn">Generate</button>
      </div>
      <div id="status" class="status"></div>
    </section>
    <section id="result" class="result hidden">
      <img id="resultImage" alt="" />
      <p id="resultCaption"></p>
    </section>
  </main>

  <script>
    const INLINE_CATEGORIES = ["subject", "style"];
    const POLL_MS = 1000;
    const state = {
      categories: [],
      environment: "",
      descriptors: "",
      prompt: "",
      is_generating: false,
      warming_message: "",
      error_message: "",
      image: "",
      final_prompt: "",
    };
    let pollTimer = null;

    function setStatus(message) {
      document.getElementById("status").textContent = message || "";
    }

    async function apiGet(path) {
      const res = await fetch(path, { method: "GET" });
      const data = await res.json();
      if (!res.ok || !data.ok) {
        throw new Error(data.error || "request failed");
      }
      return data;
    }

    async function apiPost(path, body) {
      const res = await fetch(path, {
        method: "POST",
        headers: { "Content-Type": "application/json" },
        body: JSON.stringify(body || {}),
      });
      const data = await res.json();
      if (!res.ok || !data.ok) {
        throw new Error(data.error || "request failed");
      }
      return data;
    }

    function applySnapshot(payload) {
      for (const key of Object.keys(state)) {
        if (payload[key] !== undefined) {
          state[key] = payload[key];
        }
      }
      render();
      schedulePoll();
    }

    function schedulePoll() {
      if (pollTimer) {
        clearTimeout(pollTimer);
        pollTimer = null;
      }
      if (!state.is_generating) {
        return;
      }
      pollTimer = setTimeout(async () => {
        pollTimer = null;
        try {
          applySnapshot(await apiGet("/app/status"));
        } catch (err) {
          setStatus(`Status error: ${err.message}`);
          schedulePoll();
        }
      }, POLL_MS);
    }

    function buildSelect(category) {
      const select = document.createElement("select");
      for (const option of category.options) {
        const el = document.createElement("option");
        el.value = String(option.id);
        el.textContent = option.name;
        el.disabled = option.unavailable;
        el.selected = option.id === category.selected_id;
        select.appendChild(el);
      }
      select.addEventListener("change", async () => {
        try {
          const data = await apiPost("/app/select", {
            category: category.key,
            option_id: Number(select.value),
          });
          applySnapshot(data);
          setStatus("");
        } catch (err) {
          setStatus(`Selection error: ${err.message}`);
        }
      });
      return select;
    }

    function render() {
      const sentence = document.getElementById("sentence");
      const dropdowns = document.getElementById("dropdowns");
      sentence.innerHTML = "";
      dropdowns.innerHTML = "";

      for (const category of state.categories) {
        const select = buildSelect(category);
        if (INLINE_CATEGORIES.includes(category.key)) {
          const label = document.createElement("span");
          label.textContent = category.label;
          sentence.appendChild(label);
          sentence.appendChild(select);
          continue;
        }
        const field = document.createElement("div");
        field.className = "field";
        const label = document.createElement("label");
        label.textContent = category.label;
        field.appendChild(label);
        field.appendChild(select);
        dropdowns.appendChild(field);
      }

      const environment = document.getElementById("environment");
      if (document.activeElement !== environment) {
        environment.value = state.environment;
      }
      const descriptors = document.getElementById("descriptors");
      if (document.activeElement !== descriptors) {
        descriptors.value = state.descriptors;
      }

      document.getElementById("prompt").textContent = state.prompt;

      const warming = document.getElementById("warming");
      warming.textContent = state.warming_message;
      warming.classList.toggle("hidden", !state.warming_message);

      const failure = document.getElementById("failure");
      failure.textContent = state.error_message ? `Error: ${state.error_message}` : "";
      failure.classList.toggle("hidden", !state.error_message);

      const generate = document.getElementById("generate");
      generate.disabled = state.is_generating;
      generate.innerHTML = state.is_generating ? '<span class="loader"></span>' : "Generate";

      const result = document.getElementById("result");
      result.classList.toggle("hidden", !state.image);
      if (state.image) {
        const img = document.getElementById("resultImage");
        if (img.getAttribute("src") !== state.image) {
          img.src = state.image;
        }
        img.alt = state.final_prompt;
        document.getElementById("resultCaption").textContent = state.final_prompt;
      }
    }

    function bindText(id, field) {
      const area = document.getElementById(id);
      area.addEventListener("input", async () => {
        try {
          const data = await apiPost("/app/text", { field, value: area.value });
          state.prompt = data.prompt;
          document.getElementById("prompt").textContent = state.prompt;
          setStatus("");
        } catch (err) {
          setStatus(`Save error: ${err.message}`);
        }
      });
    }

    async function init() {
      try {
        applySnapshot(await apiGet("/app/init"));
      } catch (err) {
        setStatus(`Startup error: ${err.message}`);
      }
    }

    bindText("environment", "environment");
    bindText("descriptors", "descriptors");

    document.getElementById("generate").addEventListener("click", async () => {
      if (state.is_generating) {
        return;
      }
      try {
        applySnapshot(await apiPost("/app/generate", {}));
        setStatus("");
      } catch (err) {
        setStatus(`Generate error: ${err.message}`);
      }
    });

    document.getElementById("reset").addEventListener("click", async () => {
      try {
        applySnapshot(await apiPost("/app/reset", {}));
        setStatus("");
      } catch (err) {
        setStatus(`Reset error: ${err.message}`);
      }
    });

    init();
  </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::build_main_ui_html;

    #[test]
    fn page_talks_to_app_routes() {
        let html = build_main_ui_html();
        for route in ["/app/init", "/app/status", "/app/select", "/app/text", "/app/generate"] {
            assert!(html.contains(route), "page should call {route}");
        }
    }
}
